/// The two primitives the step machine consumes from the host page.
///
/// The real implementation (DOM querying, wildcard text filters, element
/// interaction) lives with the embedder; this crate only depends on being
/// able to ask "is it there?" and "activate it".
pub trait Page: Send + Sync {
    /// Whether at least one element matches the selector.
    fn exists(&self, selector: &str) -> bool;

    /// Click/activate the first element matching the selector. Returns
    /// whether an element was found and activated.
    fn click(&self, selector: &str) -> bool;
}

use thiserror::Error;

/// Error kind for misuse of the graph API.
///
/// These are usage errors: reading a result that is not there (or not in the
/// requested form), setting a result slot twice, or naming a dependency edge
/// a node does not have. Failures *of* operations are not represented here;
/// they travel through the graph as [`Outcome`](crate::outcome::Outcome)
/// variants.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum GraphError {
    /// A result was read in the wrong form, or written more than once.
    #[error("invalid result access: {0}")]
    InvalidResult(&'static str),
    /// A dependency edge was named that the node does not have.
    #[error("bad dependency: {0}")]
    BadDependency(&'static str),
}

mod combine_latest;
mod concat;
mod merge;
mod zip;

pub use combine_latest::combine_latest;
pub use concat::concat;
pub use merge::merge;
pub use zip::{try_zip, zip};

/// Carrier for the two sides of a binary heterogeneous combinator.
#[derive(Clone)]
pub(crate) enum Pair<A, B> {
    Left(A),
    Right(B),
}

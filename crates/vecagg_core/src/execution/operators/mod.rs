pub mod aggregate;

/// Result of pulling from an operator or source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollPull {
    /// The output batch holds rows.
    Computed,
    /// Nothing more will be produced until a rescan.
    Exhausted,
}

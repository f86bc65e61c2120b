/// Classification for retry policy.
///
/// Used by the chunk scheduler and the tiered pipeline to decide how to
/// respond to a failed upstream call.
///
/// # Behavior Summary
///
/// | Class | Retry chunk? | Penalize identity? | Fall through to next tier? |
/// |-------|--------------|--------------------|----------------------------|
/// | `RotateIdentity` | Yes, on a new identity | Yes | No |
/// | `Transient` | Yes, after in-tier retries | Yes | Yes |
/// | `Terminal` | No | No | No (symbol is done) |
/// | `Never` | No | No | No |
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryClass {
    /// The upstream is throttling or rejecting the current identity.
    ///
    /// The worker records a failure against its proxy identity, rebuilds the
    /// session on a different identity and retries the chunk after backoff.
    RotateIdentity,

    /// Timeouts, dropped connections, 5xx responses and unparseable payloads.
    ///
    /// Retried a small fixed number of times inside the same tier before the
    /// pipeline falls through to the next tier.
    Transient,

    /// The instrument does not exist or the upstream has nothing for it.
    /// Retrying won't help; the symbol becomes a denylist candidate.
    Terminal,

    /// Cancellation or a collaborator failure. Stop without retrying.
    Never,
}

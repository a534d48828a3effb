//! Classification of `eth_sendRawTransaction` failures.

/// How a failed submission attempt should be handled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum Classification {
    /// The nonce was already used on chain. Consume it and retry with the
    /// next one.
    NonceConsumed,
    /// The node saw a nonce ahead of its pending count; we are submitting
    /// faster than it can keep up. Hand the nonce back and back off briefly
    /// before retrying.
    Backoff,
    /// Not a nonce problem; surface the error to the caller.
    Fatal,
}

/// Classifies a node error message from a rejected raw transaction.
///
/// Matching is on substrings because the exact phrasing differs across
/// execution clients; these are the geth strings.
pub(super) fn classify(message: &str) -> Classification {
    if message.contains("nonce too low") || message.contains("replacement transaction underpriced")
    {
        return Classification::NonceConsumed;
    }
    if message.contains("nonce too high") {
        return Classification::Backoff;
    }
    Classification::Fatal
}

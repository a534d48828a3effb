//! Hand-written ethers bindings for the three quill contracts, plus helpers to
//! pull typed events out of receipts and raw logs.

use ethers::{
    abi::RawLog,
    contract::EthEvent,
    core::types::{
        Log,
        TransactionReceipt,
        H256,
    },
};

pub mod identity_update_broadcaster;
pub mod message_broadcaster;
pub mod parameter_registry;

pub use identity_update_broadcaster::IdentityUpdateCreatedFilter;
pub use message_broadcaster::MessageSentFilter;
pub use parameter_registry::ParameterSetFilter;

#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("receipt logs contained no matching events")]
    NoLogsFound,
    #[error("expected {expected} matching events in receipt logs, found {found}")]
    UnexpectedEventCount { expected: usize, found: usize },
    #[error("failed decoding log as `{event}` event")]
    Decode {
        event: std::borrow::Cow<'static, str>,
        #[source]
        source: ethers::abi::Error,
    },
    #[error("log carries no signature topic")]
    MissingSignatureTopic,
    #[error("log signature topic `{0}` matches no known event")]
    UnknownSignature(H256),
}

/// Extracts all events of type `E` from the receipt's logs, matching on the
/// signature topic.
///
/// # Errors
/// Returns an error if no logs match, if a matching log fails to decode, or if
/// the number of matching logs differs from `expected`.
pub fn extract_events<E: EthEvent>(
    receipt: &TransactionReceipt,
    expected: usize,
) -> Result<Vec<E>, EventError> {
    let signature = E::signature();
    let mut events = Vec::with_capacity(expected);
    for log in &receipt.logs {
        if log.topics.first() != Some(&signature) {
            continue;
        }
        let event = decode_raw::<E>(log)?;
        events.push(event);
    }
    if events.is_empty() {
        return Err(EventError::NoLogsFound);
    }
    if events.len() != expected {
        return Err(EventError::UnexpectedEventCount {
            expected,
            found: events.len(),
        });
    }
    Ok(events)
}

fn decode_raw<E: EthEvent>(log: &Log) -> Result<E, EventError> {
    let raw = RawLog {
        topics: log.topics.clone(),
        data: log.data.to_vec(),
    };
    E::decode_log(&raw).map_err(|source| EventError::Decode {
        event: E::name(),
        source,
    })
}

/// A decoded log from any of the watched contracts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChainEvent {
    MessageSent(MessageSentFilter),
    IdentityUpdateCreated(IdentityUpdateCreatedFilter),
    ParameterSet(ParameterSetFilter),
}

impl ChainEvent {
    /// Decodes a raw log by dispatching on its signature topic.
    ///
    /// # Errors
    /// Returns an error if the log has no topics, the signature matches no
    /// known event, or the payload fails to decode.
    pub fn decode(log: &Log) -> Result<Self, EventError> {
        let Some(&topic0) = log.topics.first() else {
            return Err(EventError::MissingSignatureTopic);
        };
        if topic0 == MessageSentFilter::signature() {
            decode_raw(log).map(Self::MessageSent)
        } else if topic0 == IdentityUpdateCreatedFilter::signature() {
            decode_raw(log).map(Self::IdentityUpdateCreated)
        } else if topic0 == ParameterSetFilter::signature() {
            decode_raw(log).map(Self::ParameterSet)
        } else {
            Err(EventError::UnknownSignature(topic0))
        }
    }
}

#[cfg(test)]
mod tests {
    use ethers::{
        abi::{
            AbiEncode as _,
            Token,
        },
        contract::EthEvent as _,
        core::types::{
            Bytes,
            Log,
            TransactionReceipt,
            H256,
        },
    };

    use super::{
        extract_events,
        ChainEvent,
        EventError,
        IdentityUpdateCreatedFilter,
        MessageSentFilter,
    };
    use crate::message_broadcaster::AddMessageCall;

    fn message_sent_log(group_id: [u8; 16], sequence_id: u64, message: &[u8]) -> Log {
        let mut group_topic = [0u8; 32];
        group_topic[..16].copy_from_slice(&group_id);
        Log {
            topics: vec![
                MessageSentFilter::signature(),
                H256::from(group_topic),
                H256::from_low_u64_be(sequence_id),
            ],
            data: ethers::abi::encode(&[Token::Bytes(message.to_vec())]).into(),
            ..Log::default()
        }
    }

    fn identity_update_log(inbox_id: [u8; 32], sequence_id: u64, update: &[u8]) -> Log {
        Log {
            topics: vec![
                IdentityUpdateCreatedFilter::signature(),
                H256::from(inbox_id),
                H256::from_low_u64_be(sequence_id),
            ],
            data: ethers::abi::encode(&[Token::Bytes(update.to_vec())]).into(),
            ..Log::default()
        }
    }

    fn receipt_with_logs(logs: Vec<Log>) -> TransactionReceipt {
        TransactionReceipt {
            logs,
            ..TransactionReceipt::default()
        }
    }

    #[test]
    fn extracts_single_message_sent_event() {
        let receipt = receipt_with_logs(vec![message_sent_log([7; 16], 42, b"hello")]);
        let events: Vec<MessageSentFilter> = extract_events(&receipt, 1).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].group_id, [7; 16]);
        assert_eq!(events[0].sequence_id, 42);
        assert_eq!(events[0].message, Bytes::from_static(b"hello"));
    }

    #[test]
    fn skips_foreign_events_in_receipt() {
        let receipt = receipt_with_logs(vec![
            identity_update_log([1; 32], 9, b"update"),
            message_sent_log([7; 16], 42, b"hello"),
        ]);
        let events: Vec<MessageSentFilter> = extract_events(&receipt, 1).unwrap();
        assert_eq!(events[0].sequence_id, 42);
    }

    #[test]
    fn empty_receipt_is_an_error() {
        let receipt = receipt_with_logs(vec![]);
        let err = extract_events::<MessageSentFilter>(&receipt, 1).unwrap_err();
        assert!(matches!(err, EventError::NoLogsFound));
    }

    #[test]
    fn wrong_event_count_is_an_error() {
        let receipt = receipt_with_logs(vec![
            message_sent_log([7; 16], 1, b"a"),
            message_sent_log([7; 16], 2, b"b"),
        ]);
        let err = extract_events::<MessageSentFilter>(&receipt, 3).unwrap_err();
        assert!(matches!(
            err,
            EventError::UnexpectedEventCount {
                expected: 3,
                found: 2
            }
        ));
    }

    #[test]
    fn chain_event_dispatches_on_signature() {
        let decoded = ChainEvent::decode(&message_sent_log([3; 16], 5, b"m")).unwrap();
        assert!(matches!(decoded, ChainEvent::MessageSent(ref event) if event.sequence_id == 5));

        let decoded = ChainEvent::decode(&identity_update_log([4; 32], 6, b"u")).unwrap();
        assert!(
            matches!(decoded, ChainEvent::IdentityUpdateCreated(ref event) if event.sequence_id == 6)
        );
    }

    #[test]
    fn chain_event_rejects_unknown_signature() {
        let mut log = message_sent_log([3; 16], 5, b"m");
        log.topics[0] = H256::repeat_byte(0xab);
        let err = ChainEvent::decode(&log).unwrap_err();
        assert!(matches!(err, EventError::UnknownSignature(_)));
    }

    #[test]
    fn add_message_calldata_roundtrips_through_selector_check() {
        use ethers::{
            abi::AbiDecode as _,
            contract::EthCall as _,
        };
        let call = AddMessageCall {
            group_id: [1; 16],
            message: Bytes::from_static(b"payload"),
        };
        let calldata = call.clone().encode();
        assert_eq!(&calldata[..4], AddMessageCall::selector());
        // decode validates the selector prefix before the arguments
        let decoded = AddMessageCall::decode(&calldata).unwrap();
        assert_eq!(decoded, call);
    }
}

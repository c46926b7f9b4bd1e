//! Referral contract events with compile-time type safety.
//!
//! This module uses Alloy's `sol!` macro to generate event structures for the
//! two events that shape the referral tree:
//!
//! - `MemberAdded(member, upline)`: a new member joined under `upline`
//! - `UplineChanged(member, oldUpline, newUpline)`: a member was re-parented
//!
//! Raw logs are decoded into [`DecodedEvent`], which carries the block number
//! and log index needed to apply events in chain order.
//!
//! ## Example
//!
//! ```no_run
//! use referral_sync::events::{create_event_filter, EventType};
//! use alloy::primitives::address;
//!
//! let contract = address!("00000000000000000000000000000000000000aB");
//! let filter = create_event_filter(contract, EventType::MemberAdded, 100, 200);
//! # let _ = filter;
//! ```

use crate::error::{IndexerError, IndexerResult};
use alloy::primitives::{Address, Log as PrimitiveLog};
use alloy::rpc::types::{Filter, Log};
use alloy::sol;
use alloy::sol_types::SolEvent;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

sol! {
    #[sol(rpc)]
    interface IReferral {
        /// Emitted when a member registers under an upline.
        event MemberAdded(address indexed member, address indexed upline);

        /// Emitted when a member is moved to a different upline.
        event UplineChanged(
            address indexed member,
            address indexed oldUpline,
            address indexed newUpline
        );
    }
}

pub use IReferral::{MemberAdded, UplineChanged};

/// The event kinds mirrored into the member store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventType {
    /// `MemberAdded(member, upline)`
    MemberAdded,
    /// `UplineChanged(member, oldUpline, newUpline)`
    UplineChanged,
}

impl EventType {
    /// Every event type, in sync order.
    pub const ALL: [Self; 2] = [Self::MemberAdded, Self::UplineChanged];

    /// Name used as cursor key and in the HTTP API.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MemberAdded => "MemberAdded",
            Self::UplineChanged => "UplineChanged",
        }
    }

    /// Topic0 of the event.
    #[must_use]
    pub const fn signature_hash(self) -> alloy::primitives::B256 {
        match self {
            Self::MemberAdded => MemberAdded::SIGNATURE_HASH,
            Self::UplineChanged => UplineChanged::SIGNATURE_HASH,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = IndexerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MemberAdded" => Ok(Self::MemberAdded),
            "UplineChanged" => Ok(Self::UplineChanged),
            other => Err(IndexerError::validation(format!(
                "unknown event type '{other}', expected MemberAdded or UplineChanged"
            ))),
        }
    }
}

/// Which event types a sync request covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventSelection {
    /// Both event types
    #[default]
    All,
    /// A single event type
    Only(EventType),
}

impl EventSelection {
    /// Event types selected, in sync order.
    #[must_use]
    pub fn event_types(self) -> Vec<EventType> {
        match self {
            Self::All => EventType::ALL.to_vec(),
            Self::Only(event_type) => vec![event_type],
        }
    }
}

impl FromStr for EventSelection {
    type Err = IndexerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("all") {
            Ok(Self::All)
        } else {
            s.parse().map(Self::Only)
        }
    }
}

/// A referral assignment extracted from a log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberEvent {
    /// A member joined under `upline`
    Added {
        /// New member
        member: Address,
        /// Referrer
        upline: Address,
    },
    /// A member moved from `old_upline` to `new_upline`
    UplineChanged {
        /// Re-parented member
        member: Address,
        /// Previous referrer
        old_upline: Address,
        /// Current referrer
        new_upline: Address,
    },
}

impl MemberEvent {
    /// The member whose record the event updates.
    #[must_use]
    pub const fn member(&self) -> Address {
        match self {
            Self::Added { member, .. } | Self::UplineChanged { member, .. } => *member,
        }
    }

    /// The referrer the member has after this event.
    #[must_use]
    pub const fn referrer(&self) -> Address {
        match self {
            Self::Added { upline, .. } => *upline,
            Self::UplineChanged { new_upline, .. } => *new_upline,
        }
    }

    /// Event type this assignment came from.
    #[must_use]
    pub const fn event_type(&self) -> EventType {
        match self {
            Self::Added { .. } => EventType::MemberAdded,
            Self::UplineChanged { .. } => EventType::UplineChanged,
        }
    }
}

/// A decoded event positioned in the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedEvent {
    /// Decoded payload
    pub event: MemberEvent,
    /// Block that emitted the log
    pub block_number: u64,
    /// Position of the log within its block
    pub log_index: u64,
}

impl DecodedEvent {
    /// Chain ordering key.
    #[must_use]
    pub const fn position(&self) -> (u64, u64) {
        (self.block_number, self.log_index)
    }
}

/// Sort events by `(block_number, log_index)`.
///
/// Providers usually return logs in this order already; the sort is stable so
/// equal positions keep their relative order.
pub fn sort_by_position(events: &mut [DecodedEvent]) {
    events.sort_by_key(DecodedEvent::position);
}

/// Create a filter for one event type emitted by `contract` in `[from_block, to_block]`.
#[must_use]
pub fn create_event_filter(
    contract: Address,
    event_type: EventType,
    from_block: u64,
    to_block: u64,
) -> Filter {
    Filter::new()
        .address(contract)
        .event_signature(event_type.signature_hash())
        .from_block(from_block)
        .to_block(to_block)
}

/// Decode an RPC log of the given type.
///
/// # Errors
///
/// Returns a decoding error when the log lacks a block number or its topics
/// and data don't match the event signature.
pub fn decode_log(event_type: EventType, log: &Log) -> IndexerResult<DecodedEvent> {
    let block_number = log
        .block_number
        .ok_or_else(|| IndexerError::decoding("Log missing block number", None))?;
    let log_index = log.log_index.unwrap_or_default();

    // Convert RPC Log to Primitive Log for decoding
    let primitive_log = PrimitiveLog {
        address: log.address(),
        data: log.data().clone(),
    };

    let event = match event_type {
        EventType::MemberAdded => {
            let decoded = MemberAdded::decode_log(&primitive_log, true).map_err(|e| {
                IndexerError::decoding(format!("Failed to decode MemberAdded: {e}"), None)
            })?;
            MemberEvent::Added {
                member: decoded.data.member,
                upline: decoded.data.upline,
            }
        }
        EventType::UplineChanged => {
            let decoded = UplineChanged::decode_log(&primitive_log, true).map_err(|e| {
                IndexerError::decoding(format!("Failed to decode UplineChanged: {e}"), None)
            })?;
            MemberEvent::UplineChanged {
                member: decoded.data.member,
                old_upline: decoded.data.oldUpline,
                new_upline: decoded.data.newUpline,
            }
        }
    };

    Ok(DecodedEvent {
        event,
        block_number,
        log_index,
    })
}

/// Canonical store key for an address: `0x`-prefixed lowercase hex.
#[must_use]
pub fn normalize_address(address: &Address) -> String {
    address.to_string().to_lowercase()
}

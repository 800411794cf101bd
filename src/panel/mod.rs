//! Control-panel integration: response envelopes, account lookup and the
//! dual-protocol suspension client.

pub mod account;
pub mod client;
pub mod envelope;

pub use account::{AccountIdentity, AccountResolver, WhmAccountResolver};
pub use client::{Attempt, OutgoingAction, OutgoingSuspender, SuspensionClient};
pub use envelope::{PanelOutcome, decode_legacy_proxy, decode_uapi, decode_whm_api1};

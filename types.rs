use ink::primitives::AccountId;
use scale::{Decode, Encode};

/// Sentinel anchoring the head of a weight list or delta log; never a real key.
pub const ROOT: AccountId = AccountId::from([0u8; 32]);
/// Sentinel marking the tail of a weight list; never a real key.
pub const END: AccountId = AccountId::from([1u8; 32]);

/// Sentinel anchoring the head of a proxy's delta log. Cycle `0` can never
/// be a real delta-log key, so it doubles as the list root.
pub const ROOT_CYCLE: u64 = 0;
/// Sentinel marking the tail of a proxy's delta log. Cycle `u64::MAX` can
/// never be a real delta-log key, so it doubles as the list end.
pub const END_CYCLE: u64 = u64::MAX;

/// One entry in a sender's weight list: the weights a sender has assigned to
/// one address, plus the intrusive link to the next live entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
#[cfg_attr(feature = "std", derive(scale_info::TypeInfo, ink::storage::traits::StorageLayout))]
pub struct SenderWeightNode {
    pub receiver_weight: u32,
    pub proxy_weight: u32,
    pub next: AccountId,
}

impl Default for SenderWeightNode {
    fn default() -> Self {
        Self { receiver_weight: 0, proxy_weight: 0, next: END }
    }
}

impl SenderWeightNode {
    pub fn is_zeroed(&self) -> bool {
        self.receiver_weight == 0 && self.proxy_weight == 0
    }
}

/// One entry in a proxy's own weight list: receiver-weight only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
#[cfg_attr(feature = "std", derive(scale_info::TypeInfo, ink::storage::traits::StorageLayout))]
pub struct ProxyWeightNode {
    pub receiver_weight: u32,
    pub next: AccountId,
}

impl Default for ProxyWeightNode {
    fn default() -> Self {
        Self { receiver_weight: 0, next: END }
    }
}

impl ProxyWeightNode {
    pub fn is_zeroed(&self) -> bool {
        self.receiver_weight == 0
    }
}

/// One entry in a proxy's delta log: a scheduled change to the per-weight
/// rate the proxy distributes, plus the intrusive link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
#[cfg_attr(feature = "std", derive(scale_info::TypeInfo, ink::storage::traits::StorageLayout))]
pub struct ProxyDeltaNode {
    pub this_cycle: i128,
    pub next_cycle: i128,
    pub next: u64,
}

impl Default for ProxyDeltaNode {
    fn default() -> Self {
        Self { this_cycle: 0, next_cycle: 0, next: END_CYCLE }
    }
}

impl ProxyDeltaNode {
    pub fn is_zeroed(&self) -> bool {
        self.this_cycle == 0 && self.next_cycle == 0
    }
}

/// A receiver's per-cycle signed delta pair. Unlike the weight list and the
/// proxy delta log, the receiver ledger is addressed directly by cycle
/// number during collection rather than walked as a linked list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode, Default)]
#[cfg_attr(feature = "std", derive(scale_info::TypeInfo, ink::storage::traits::StorageLayout))]
pub struct CycleDelta {
    pub this_cycle: i128,
    pub next_cycle: i128,
}

/// Per-sender account state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode, Default)]
#[cfg_attr(feature = "std", derive(scale_info::TypeInfo, ink::storage::traits::StorageLayout))]
pub struct SenderAccount {
    pub start_time: u64,
    pub start_balance: u128,
    pub weight_sum: u32,
    pub weight_count: u32,
    pub amt_per_sec: u128,
}

/// Per-proxy account state. `configured` distinguishes the *absent* state
/// (no entry ever made) from *present* (weights sum to `PROXY_WEIGHTS_SUM`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode, Default)]
#[cfg_attr(feature = "std", derive(scale_info::TypeInfo, ink::storage::traits::StorageLayout))]
pub struct ProxyAccount {
    pub configured: bool,
    pub weight_sum: u32,
    pub weight_count: u32,
}

/// Per-receiver account state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode, Default)]
#[cfg_attr(feature = "std", derive(scale_info::TypeInfo, ink::storage::traits::StorageLayout))]
pub struct ReceiverAccount {
    pub next_collected_cycle: u64,
    pub last_funds_per_cycle: i128,
}

impl ReceiverAccount {
    pub fn is_initialised(&self) -> bool {
        self.next_collected_cycle != 0
    }
}

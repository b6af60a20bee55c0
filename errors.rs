use scale::{Decode, Encode};

/// Errors that can occur in the FundingPool contract.
///
/// Every variant is fatal to the operation that raised it: state is left
/// unchanged and the error is returned verbatim to the caller.
#[derive(Debug, PartialEq, Eq, Encode, Decode)]
#[cfg_attr(feature = "std", derive(scale_info::TypeInfo))]
pub enum Error {
    /// A weight-list operation targeted a reserved sentinel address (`ROOT`/`END`).
    InvalidAddress,
    /// A delta-log write targeted cycle `0` or `u64::MAX`, both reserved.
    InvalidCycle,
    /// A withdrawal would take more than the sender's current balance.
    InsufficientFunds,
    /// A sender's weight-list update would push `weight_sum` past `SENDER_WEIGHTS_SUM_MAX`.
    WeightSumOverflow,
    /// A sender's weight-list update would push `weight_count` past `SENDER_WEIGHTS_COUNT_MAX`.
    TooManyReceivers,
    /// A sender referenced a proxy that has never been configured.
    ProxyMissing,
    /// A sender's proxy weight is not a multiple of `PROXY_WEIGHTS_SUM`.
    ProxyWeightNotMultiple,
    /// A proxy reconfiguration's new receiver weights do not sum to `PROXY_WEIGHTS_SUM`.
    ProxyBadSum,
    /// A proxy reconfiguration would exceed `PROXY_WEIGHTS_COUNT_MAX` entries.
    ProxyTooManyReceivers,
    /// The asset-layer collaborator reported a failed transfer.
    AssetTransferFailed,
}

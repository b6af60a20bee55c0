use ink::primitives::AccountId;

/// Emitted once per successful `update_sender`, after every step of the
/// stop/top-up/withdraw/rate/receiver/proxy/start sequence has been applied.
#[ink::event]
pub struct SenderUpdated {
    #[ink(topic)]
    pub sender: AccountId,
    pub balance: u128,
    pub amt_per_sec: u128,
}

/// Emitted once per direct receiver whose projected stream changed as part
/// of an `update_sender` call.
#[ink::event]
pub struct SenderToReceiverUpdated {
    #[ink(topic)]
    pub sender: AccountId,
    #[ink(topic)]
    pub receiver: AccountId,
    pub receiver_weight: u32,
}

/// Emitted once per proxy whose projected stream changed as part of an
/// `update_sender` call.
#[ink::event]
pub struct SenderToProxyUpdated {
    #[ink(topic)]
    pub sender: AccountId,
    #[ink(topic)]
    pub proxy: AccountId,
    pub proxy_weight: u32,
}

/// Emitted once per entry supplied to a successful `set_proxy_weights` call.
#[ink::event]
pub struct ProxyToReceiverUpdated {
    #[ink(topic)]
    pub proxy: AccountId,
    #[ink(topic)]
    pub receiver: AccountId,
    pub receiver_weight: u32,
}

/// Emitted once per successful `collect`.
#[ink::event]
pub struct Collected {
    #[ink(topic)]
    pub receiver: AccountId,
    pub amount: u128,
}

use super::*;

fn default_accounts() -> ink::env::test::DefaultAccounts<ink::env::DefaultEnvironment> {
    ink::env::test::default_accounts::<ink::env::DefaultEnvironment>()
}

fn set_caller(caller: AccountId) {
    ink::env::test::set_caller::<ink::env::DefaultEnvironment>(caller);
}

fn set_value_transferred(value: Balance) {
    ink::env::test::set_value_transferred::<ink::env::DefaultEnvironment>(value);
}

fn set_block_timestamp(t: u64) {
    ink::env::test::set_block_timestamp::<ink::env::DefaultEnvironment>(t);
}

fn fund_contract(balance: Balance) {
    let callee = ink::env::test::callee::<ink::env::DefaultEnvironment>();
    ink::env::test::set_account_balance::<ink::env::DefaultEnvironment>(callee, balance);
}

#[ink::test]
fn test_constructor_and_constants() {
    let contract = FundingPool::new(10);
    assert_eq!(contract.cycle_secs(), 10);
    assert_eq!(contract.sender_weights_sum_max(), SENDER_WEIGHTS_SUM_MAX);
    assert_eq!(contract.sender_weights_count_max(), SENDER_WEIGHTS_COUNT_MAX);
    assert_eq!(contract.proxy_weights_sum(), PROXY_WEIGHTS_SUM);
    assert_eq!(contract.proxy_weights_count_max(), PROXY_WEIGHTS_COUNT_MAX);
    assert_eq!(contract.withdraw_all_sentinel(), WITHDRAW_ALL);
    assert_eq!(contract.amt_per_sec_unchanged_sentinel(), AMT_PER_SEC_UNCHANGED);
    assert_eq!(contract.max_timestamp(), MAX_TIMESTAMP);
    assert_eq!(contract.get_amt_per_sec(default_accounts().alice), 0);
    assert_eq!(contract.collectable(default_accounts().alice), 0);
}

#[ink::test]
fn test_weight_list_sentinel_rejection() {
    let accounts = default_accounts();
    let mut contract = FundingPool::new(10);
    assert_eq!(contract.set_receiver_weight(accounts.alice, ROOT, 1), Err(Error::InvalidAddress));
    assert_eq!(contract.set_receiver_weight(accounts.alice, END, 1), Err(Error::InvalidAddress));
    assert_eq!(contract.set_proxy_weight(accounts.alice, ROOT, 1), Err(Error::InvalidAddress));
    assert_eq!(contract.set_proxy_weight(accounts.alice, END, 1), Err(Error::InvalidAddress));
}

#[ink::test]
fn test_weight_list_lifo_order() {
    let accounts = default_accounts();
    let mut contract = FundingPool::new(10);
    contract.set_receiver_weight(accounts.alice, accounts.bob, 1).unwrap();
    contract.set_receiver_weight(accounts.alice, accounts.charlie, 2).unwrap();

    // Most-recently-linked address surfaces first: charlie was linked
    // after bob, so it sits at the head of the list.
    let all = contract.get_all_receivers(accounts.alice);
    assert_eq!(all, vec![(accounts.charlie, 2, 0), (accounts.bob, 1, 0)]);

    // Zeroing a weight doesn't remove it from the list by itself; a
    // subsequent read walks past it via pruning.
    contract.set_receiver_weight(accounts.alice, accounts.bob, 0).unwrap();
    assert!(!contract.is_zeroed(accounts.alice));
    let all = contract.get_all_receivers(accounts.alice);
    assert_eq!(all, vec![(accounts.charlie, 2, 0)]);
}

#[ink::test]
fn test_proxy_delta_log_pruning() {
    let accounts = default_accounts();
    let mut contract = FundingPool::new(10);
    let proxy = accounts.django;

    assert_eq!(contract.add_to_proxy_delta(proxy, ROOT_CYCLE, 1, 1), Err(Error::InvalidCycle));
    assert_eq!(contract.add_to_proxy_delta(proxy, END_CYCLE, 1, 1), Err(Error::InvalidCycle));

    contract.add_to_proxy_delta(proxy, 5, 10, 20).unwrap();
    contract.add_to_proxy_delta(proxy, 7, 3, 4).unwrap();

    let (cycle, _, d_this, d_next) = contract.next_delta_pruning(proxy, ROOT_CYCLE, ROOT_CYCLE);
    assert_eq!((cycle, d_this, d_next), (5, 10, 20));

    // Cancel cycle 5 back to zero; it must be pruned away on the next walk.
    contract.add_to_proxy_delta(proxy, 5, -10, -20).unwrap();
    let (cycle, _, d_this, d_next) = contract.next_delta_pruning(proxy, ROOT_CYCLE, ROOT_CYCLE);
    assert_eq!((cycle, d_this, d_next), (7, 3, 4));
    let (cycle, _, _, _) = contract.next_delta_pruning(proxy, 7, ROOT_CYCLE);
    assert_eq!(cycle, ROOT_CYCLE);
}

/// Top up 100 at a rate of 1/sec to a single receiver, withdraw the rest
/// after 16 seconds, then let the receiver collect.
#[ink::test]
fn test_scenario_single_sender_single_receiver() {
    let accounts = default_accounts();
    let mut contract = FundingPool::new(10);

    set_caller(accounts.alice);
    set_block_timestamp(1_000);
    set_value_transferred(100);
    let withdrawn = contract.update_sender(0, 1, vec![(accounts.bob, 1)], vec![]).unwrap();
    assert_eq!(withdrawn, 0);

    fund_contract(1_000);
    set_caller(accounts.alice);
    set_value_transferred(0);
    set_block_timestamp(1_016);
    let withdrawn = contract
        .update_sender(WITHDRAW_ALL, AMT_PER_SEC_UNCHANGED, vec![], vec![])
        .unwrap();
    assert_eq!(withdrawn, 84);

    set_block_timestamp(1_100);
    assert_eq!(contract.collectable(accounts.bob), 16);
    set_caller(accounts.bob);
    let collected = contract.collect().unwrap();
    assert_eq!(collected, 16);
    assert_eq!(contract.collectable(accounts.bob), 0);
}

/// A second receiver is added a second into the stream, splitting the
/// rate evenly from then on; the sender withdraws the remainder at 15s.
#[ink::test]
fn test_scenario_two_receivers_rate_two() {
    let accounts = default_accounts();
    let mut contract = FundingPool::new(10);

    set_caller(accounts.alice);
    set_block_timestamp(1_000);
    set_value_transferred(100);
    contract.update_sender(0, 2, vec![(accounts.bob, 1)], vec![]).unwrap();

    set_caller(accounts.alice);
    set_value_transferred(0);
    set_block_timestamp(1_001);
    contract
        .update_sender(0, AMT_PER_SEC_UNCHANGED, vec![(accounts.charlie, 1)], vec![])
        .unwrap();

    fund_contract(1_000);
    set_caller(accounts.alice);
    set_value_transferred(0);
    set_block_timestamp(1_015);
    let withdrawn = contract.update_sender(70, AMT_PER_SEC_UNCHANGED, vec![], vec![]).unwrap();
    assert_eq!(withdrawn, 70);

    set_block_timestamp(1_200);
    assert_eq!(contract.collectable(accounts.bob), 16);
    assert_eq!(contract.collectable(accounts.charlie), 14);
}

/// At a rate of 9/sec against a weight of 1, a 100 top-up exhausts itself
/// mid-second: the receiver ultimately collects 99, the sender only 1.
#[ink::test]
fn test_scenario_funds_exhaust() {
    let accounts = default_accounts();
    let mut contract = FundingPool::new(10);

    set_caller(accounts.alice);
    set_block_timestamp(1_000);
    set_value_transferred(100);
    contract.update_sender(0, 9, vec![(accounts.bob, 1)], vec![]).unwrap();

    fund_contract(1_000);
    set_caller(accounts.alice);
    set_value_transferred(0);
    set_block_timestamp(1_011);
    let withdrawn = contract
        .update_sender(WITHDRAW_ALL, AMT_PER_SEC_UNCHANGED, vec![], vec![])
        .unwrap();
    assert_eq!(withdrawn, 1);

    set_block_timestamp(1_200);
    assert_eq!(contract.collectable(accounts.bob), 99);
}

/// A sender streams exclusively through a proxy that fans everything out
/// to a single receiver.
#[ink::test]
fn test_scenario_proxy_fanout() {
    let accounts = default_accounts();
    let mut contract = FundingPool::new(10);
    let proxy = accounts.django;

    set_caller(proxy);
    set_block_timestamp(1_000);
    contract.set_proxy_weights(vec![(accounts.eve, 100)]).unwrap();

    set_caller(accounts.alice);
    set_value_transferred(2_500);
    set_block_timestamp(2_000);
    contract.update_sender(0, 100, vec![], vec![(proxy, 100)]).unwrap();

    // The stream runs from t=2000 at 1 unit/sec and exhausts the 2_500
    // top-up after 25s (t=2025), long before this read; eve holds the
    // proxy's entire fan-out weight, so she collects all of it.
    set_block_timestamp(2_200);
    assert_eq!(contract.collectable(accounts.eve), 2_500);
}

/// A proxy splits 50/50 between two receivers for one full cycle, then
/// reconfigures to drop one and add two more. Funds already accrued by
/// the dropped receiver in the finished cycle stay with it; only the
/// still-open cycle onward is redirected.
#[ink::test]
fn test_scenario_proxy_reconfig_mid_stream() {
    let accounts = default_accounts();
    let mut contract = FundingPool::new(10);
    let proxy = accounts.django;

    set_caller(proxy);
    set_block_timestamp(1_000);
    contract
        .set_proxy_weights(vec![(accounts.eve, 50), (accounts.frank, 50)])
        .unwrap();

    set_caller(accounts.alice);
    set_value_transferred(2_500);
    set_block_timestamp(1_000);
    contract.update_sender(0, 100, vec![], vec![(proxy, 100)]).unwrap();

    // One full cycle later, swap frank out for two new receivers.
    set_caller(proxy);
    set_block_timestamp(1_010);
    contract
        .set_proxy_weights(vec![(accounts.frank, 0), (accounts.django, 25), (accounts.charlie, 25)])
        .unwrap();

    set_block_timestamp(1_200);
    assert_eq!(contract.collectable(accounts.eve), 1_250);
    assert_eq!(contract.collectable(accounts.frank), 500);
    assert_eq!(contract.collectable(accounts.django), 375);
    assert_eq!(contract.collectable(accounts.charlie), 375);
}

/// Withdrawing everything while leaving the rate and weight lists
/// untouched still settles and tears down the stream correctly.
#[ink::test]
fn test_scenario_sentinel_withdrawal() {
    let accounts = default_accounts();
    let mut contract = FundingPool::new(10);

    set_caller(accounts.alice);
    set_block_timestamp(1_000);
    set_value_transferred(10);
    contract.update_sender(0, 1, vec![(accounts.bob, 1)], vec![]).unwrap();

    fund_contract(1_000);
    set_caller(accounts.alice);
    set_value_transferred(0);
    set_block_timestamp(1_005);
    let withdrawn = contract
        .update_sender(WITHDRAW_ALL, AMT_PER_SEC_UNCHANGED, vec![], vec![])
        .unwrap();
    assert_eq!(withdrawn, 5);
}

/// With `amt_per_sec` held at `0` across every call, no stream is ever
/// active (`weight_sum` stays `0` since no receivers/proxies are named),
/// so `withdrawable()` must track the running net of top-ups minus
/// withdrawals exactly, independent of elapsed time.
#[ink::test]
fn test_round_trip_net_balance_with_zero_rate() {
    let accounts = default_accounts();
    let mut contract = FundingPool::new(10);

    set_caller(accounts.alice);
    set_block_timestamp(1_000);
    set_value_transferred(500);
    contract.update_sender(0, 0, vec![], vec![]).unwrap();
    assert_eq!(contract.withdrawable(accounts.alice), 500);

    fund_contract(1_000);
    set_block_timestamp(1_050);
    set_value_transferred(200);
    let withdrawn = contract.update_sender(150, 0, vec![], vec![]).unwrap();
    assert_eq!(withdrawn, 150);
    assert_eq!(contract.withdrawable(accounts.alice), 500 + 200 - 150);

    set_block_timestamp(1_100);
    set_value_transferred(0);
    let withdrawn = contract.update_sender(300, 0, vec![], vec![]).unwrap();
    assert_eq!(withdrawn, 300);
    assert_eq!(contract.withdrawable(accounts.alice), 500 + 200 - 150 - 300);
}

#[ink::test]
fn test_collectable_monotonic_and_zero_after_collect() {
    let accounts = default_accounts();
    let mut contract = FundingPool::new(10);

    set_caller(accounts.alice);
    set_block_timestamp(1_000);
    set_value_transferred(1_000);
    contract.update_sender(0, 1, vec![(accounts.bob, 1)], vec![]).unwrap();
    fund_contract(10_000);

    let mut last = 0u128;
    for t in [1_010, 1_030, 1_070, 1_150] {
        set_block_timestamp(t);
        let now_collectable = contract.collectable(accounts.bob);
        assert!(now_collectable >= last);
        last = now_collectable;
    }

    set_caller(accounts.bob);
    set_block_timestamp(1_150);
    contract.collect().unwrap();
    assert_eq!(contract.collectable(accounts.bob), 0);
}

#[ink::test]
fn test_amt_per_sec_below_weight_sum_yields_zero_flow() {
    let accounts = default_accounts();
    let mut contract = FundingPool::new(10);

    set_caller(accounts.alice);
    set_block_timestamp(1_000);
    set_value_transferred(1_000);
    // amt_per_sec (1) is below weight_sum (2): no stream is active at all.
    contract
        .update_sender(0, 1, vec![(accounts.bob, 1), (accounts.charlie, 1)], vec![])
        .unwrap();

    set_block_timestamp(2_000);
    assert_eq!(contract.collectable(accounts.bob), 0);
    assert_eq!(contract.collectable(accounts.charlie), 0);
    assert_eq!(contract.withdrawable(accounts.alice), 1_000);
}

#[ink::test]
fn test_idempotent_noop() {
    let accounts = default_accounts();
    let mut contract = FundingPool::new(10);

    set_caller(accounts.alice);
    set_block_timestamp(1_000);
    set_value_transferred(1_000);
    contract.update_sender(0, 1, vec![(accounts.bob, 1)], vec![]).unwrap();

    let before = contract.withdrawable(accounts.alice);
    let before_rate = contract.get_amt_per_sec(accounts.alice);

    set_block_timestamp(1_050);
    set_value_transferred(0);
    let withdrawn = contract
        .update_sender(0, AMT_PER_SEC_UNCHANGED, vec![], vec![])
        .unwrap();
    assert_eq!(withdrawn, 0);
    assert_eq!(contract.get_amt_per_sec(accounts.alice), before_rate);
    // Fifty seconds have streamed out, the untouched rate and weights are
    // the same, so only the elapsed flow (not a balance jump) changed.
    assert_eq!(before - contract.withdrawable(accounts.alice), 50);
}

#[ink::test]
fn test_max_timestamp_capping() {
    let accounts = default_accounts();
    let mut contract = FundingPool::new(10);

    set_caller(accounts.alice);
    set_block_timestamp(1_000);
    set_value_transferred(u128::MAX / 2);
    contract.update_sender(0, 1, vec![(accounts.bob, 1)], vec![]).unwrap();

    // However far in the future we look, the stream can never be
    // projected past MAX_TIMESTAMP.
    set_block_timestamp(MAX_TIMESTAMP);
    let withdrawable = contract.withdrawable(accounts.alice);
    assert!(withdrawable > 0);
}

#[ink::test]
fn test_update_sender_invalid_address() {
    let accounts = default_accounts();
    let mut contract = FundingPool::new(10);
    set_caller(accounts.alice);
    set_block_timestamp(1_000);
    let result = contract.update_sender(0, 1, vec![(ROOT, 1)], vec![]);
    assert_eq!(result, Err(Error::InvalidAddress));
    let result = contract.update_sender(0, 1, vec![], vec![(END, 1)]);
    assert_eq!(result, Err(Error::InvalidAddress));
}

#[ink::test]
fn test_update_sender_insufficient_funds() {
    let accounts = default_accounts();
    let mut contract = FundingPool::new(10);
    set_caller(accounts.alice);
    set_block_timestamp(1_000);
    set_value_transferred(10);
    let result = contract.update_sender(11, AMT_PER_SEC_UNCHANGED, vec![], vec![]);
    assert_eq!(result, Err(Error::InsufficientFunds));
}

#[ink::test]
fn test_update_sender_weight_sum_overflow() {
    let accounts = default_accounts();
    let mut contract = FundingPool::new(10);
    set_caller(accounts.alice);
    set_block_timestamp(1_000);
    let result = contract.update_sender(0, 1, vec![(accounts.bob, SENDER_WEIGHTS_SUM_MAX + 1)], vec![]);
    assert_eq!(result, Err(Error::WeightSumOverflow));
}

#[ink::test]
fn test_update_sender_too_many_receivers() {
    let accounts = default_accounts();
    let mut contract = FundingPool::new(10);
    set_caller(accounts.alice);
    set_block_timestamp(1_000);
    let many: Vec<(AccountId, u32)> = (0..=SENDER_WEIGHTS_COUNT_MAX)
        .map(|i| {
            let mut bytes = [0u8; 32];
            bytes[..4].copy_from_slice(&i.to_le_bytes());
            (AccountId::from(bytes), 1)
        })
        .collect();
    let result = contract.update_sender(0, 1, many, vec![]);
    assert_eq!(result, Err(Error::TooManyReceivers));
}

#[ink::test]
fn test_update_sender_proxy_missing() {
    let accounts = default_accounts();
    let mut contract = FundingPool::new(10);
    set_caller(accounts.alice);
    set_block_timestamp(1_000);
    let result = contract.update_sender(0, 1, vec![], vec![(accounts.django, 100)]);
    assert_eq!(result, Err(Error::ProxyMissing));
}

#[ink::test]
fn test_update_sender_proxy_weight_not_multiple() {
    let accounts = default_accounts();
    let mut contract = FundingPool::new(10);
    set_caller(accounts.django);
    set_block_timestamp(1_000);
    contract.set_proxy_weights(vec![(accounts.eve, 100)]).unwrap();

    set_caller(accounts.alice);
    let result = contract.update_sender(0, 1, vec![], vec![(accounts.django, 50)]);
    assert_eq!(result, Err(Error::ProxyWeightNotMultiple));
}

#[ink::test]
fn test_set_proxy_weights_bad_sum() {
    let accounts = default_accounts();
    let mut contract = FundingPool::new(10);
    set_caller(accounts.django);
    set_block_timestamp(1_000);
    let result = contract.set_proxy_weights(vec![(accounts.eve, 40), (accounts.frank, 40)]);
    assert_eq!(result, Err(Error::ProxyBadSum));
}

#[ink::test]
fn test_set_proxy_weights_too_many_receivers() {
    let accounts = default_accounts();
    let mut contract = FundingPool::new(10);
    set_caller(accounts.django);
    set_block_timestamp(1_000);
    let many: Vec<(AccountId, u32)> = (0..=PROXY_WEIGHTS_COUNT_MAX)
        .map(|i| {
            let mut bytes = [0u8; 32];
            bytes[..4].copy_from_slice(&i.to_le_bytes());
            (AccountId::from(bytes), 1)
        })
        .collect();
    let result = contract.set_proxy_weights(many);
    assert_eq!(result, Err(Error::ProxyTooManyReceivers));
}

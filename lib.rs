#![cfg_attr(not(feature = "std"), no_std, no_main)]

mod errors;
mod events;
mod types;

pub use errors::Error;

/// A continuous funding pool: senders stream a per-second rate to a weighted
/// set of receivers and proxies, proxies fan a share of what they receive out
/// to their own weighted receiver set, and receivers pull whatever has
/// finished streaming to them with `collect`.
#[ink::contract]
mod funding_pool {
    use crate::events::{Collected, ProxyToReceiverUpdated, SenderToProxyUpdated, SenderToReceiverUpdated, SenderUpdated};
    use crate::types::{
        CycleDelta, ProxyAccount, ProxyDeltaNode, ProxyWeightNode, ReceiverAccount, SenderAccount, SenderWeightNode,
        END, END_CYCLE, ROOT, ROOT_CYCLE,
    };
    use crate::Error;
    use ink::prelude::vec::Vec;
    use ink::storage::Mapping;

    /// Upper bound on a sender's combined receiver+proxy weight total.
    pub const SENDER_WEIGHTS_SUM_MAX: u32 = 10_000;
    /// Upper bound on a sender's weight-list bookkeeping cost (a direct
    /// receiver costs 1, a proxy costs `PROXY_WEIGHTS_COUNT_MAX`).
    pub const SENDER_WEIGHTS_COUNT_MAX: u32 = 100;
    /// A proxy's receiver weights must always sum to exactly this.
    pub const PROXY_WEIGHTS_SUM: u32 = 100;
    /// Upper bound on the number of receivers a single proxy can list.
    pub const PROXY_WEIGHTS_COUNT_MAX: u32 = 10;
    /// Sentinel `withdraw_amt`: withdraw the entire current balance.
    pub const WITHDRAW_ALL: u128 = u128::MAX;
    /// Sentinel `amt_per_sec`: leave the sender's current rate unchanged.
    pub const AMT_PER_SEC_UNCHANGED: u128 = u128::MAX;
    /// Streams are never projected past this timestamp, regardless of how far
    /// the balance/rate arithmetic would otherwise carry them.
    pub const MAX_TIMESTAMP: u64 = u64::MAX - 2;

    /// The result of tearing a stream down or standing one back up: the
    /// instant at which it will exhaust itself and the per-weight-point rate
    /// that was in effect over `[now, end_time)`.
    struct StreamPlan {
        end_time: u64,
        amt_per_weight: u128,
    }

    /// A single weight-list write staged during `update_sender` validation,
    /// not yet applied to storage.
    struct WeightOp {
        addr: AccountId,
        is_proxy: bool,
        weight: u32,
    }

    /// The outcome of validating a batch of receiver/proxy weight updates:
    /// every write that would need to happen, plus the resulting totals, with
    /// no storage touched yet.
    struct WeightUpdatePlan {
        ops: Vec<WeightOp>,
        weight_sum: u32,
        weight_count: u32,
    }

    #[ink(storage)]
    pub struct FundingPool {
        cycle_secs: u64,
        senders: Mapping<AccountId, SenderAccount>,
        sender_weights: Mapping<(AccountId, AccountId), SenderWeightNode>,
        proxies: Mapping<AccountId, ProxyAccount>,
        proxy_weights: Mapping<(AccountId, AccountId), ProxyWeightNode>,
        proxy_deltas: Mapping<(AccountId, u64), ProxyDeltaNode>,
        receivers: Mapping<AccountId, ReceiverAccount>,
        receiver_deltas: Mapping<(AccountId, u64), CycleDelta>,
    }

    impl FundingPool {
        /// `cycle_secs` must be nonzero; it is the resolution at which
        /// streams are settled into collectable funds.
        #[ink(constructor)]
        pub fn new(cycle_secs: u64) -> Self {
            Self {
                cycle_secs,
                senders: Mapping::default(),
                sender_weights: Mapping::default(),
                proxies: Mapping::default(),
                proxy_weights: Mapping::default(),
                proxy_deltas: Mapping::default(),
                receivers: Mapping::default(),
                receiver_deltas: Mapping::default(),
            }
        }

        // ===== Constants =====

        #[ink(message)]
        pub fn cycle_secs(&self) -> u64 {
            self.cycle_secs
        }

        #[ink(message)]
        pub fn sender_weights_sum_max(&self) -> u32 {
            SENDER_WEIGHTS_SUM_MAX
        }

        #[ink(message)]
        pub fn sender_weights_count_max(&self) -> u32 {
            SENDER_WEIGHTS_COUNT_MAX
        }

        #[ink(message)]
        pub fn proxy_weights_sum(&self) -> u32 {
            PROXY_WEIGHTS_SUM
        }

        #[ink(message)]
        pub fn proxy_weights_count_max(&self) -> u32 {
            PROXY_WEIGHTS_COUNT_MAX
        }

        #[ink(message)]
        pub fn withdraw_all_sentinel(&self) -> u128 {
            WITHDRAW_ALL
        }

        #[ink(message)]
        pub fn amt_per_sec_unchanged_sentinel(&self) -> u128 {
            AMT_PER_SEC_UNCHANGED
        }

        #[ink(message)]
        pub fn max_timestamp(&self) -> u64 {
            MAX_TIMESTAMP
        }

        // ===== Sender-facing streaming core =====

        /// Runs the full stop/top-up/withdraw/rate/receiver/proxy/start
        /// sequence atomically against the caller's own sender account.
        /// Value attached to the call is treated as a top-up. Returns the
        /// amount actually withdrawn.
        #[ink(message, payable)]
        pub fn update_sender(
            &mut self,
            withdraw_amt: u128,
            amt_per_sec: u128,
            receiver_weights: Vec<(AccountId, u32)>,
            proxy_weights: Vec<(AccountId, u32)>,
        ) -> Result<u128, Error> {
            let sender = self.env().caller();
            let top_up_amt = self.env().transferred_value();
            let now = self.now();

            let mut acc = self.senders.get(sender).unwrap_or_default();

            // Step 1 (compute half): tear down the current stream arithmetically.
            // The actual delta projection is deferred until every later step
            // has validated, so a rejected update never mutates storage.
            let stop_plan = self.compute_stop(&mut acc, now);

            // Step 2.
            acc.start_balance = acc.start_balance.saturating_add(top_up_amt);

            // Step 3.
            let withdraw_amt = if withdraw_amt == WITHDRAW_ALL { acc.start_balance } else { withdraw_amt };
            if withdraw_amt > acc.start_balance {
                return Err(Error::InsufficientFunds);
            }
            acc.start_balance -= withdraw_amt;

            // Step 4.
            if amt_per_sec != AMT_PER_SEC_UNCHANGED {
                acc.amt_per_sec = amt_per_sec;
            }

            // Steps 5 & 6, validation only.
            let plan = self.validate_weight_updates(sender, &acc, &receiver_weights, &proxy_weights)?;

            // Every fallible check has now passed. Commit in sequence.
            if let Some(stop_plan) = stop_plan {
                self.apply_weight_list_deltas(sender, now, stop_plan.end_time, -(stop_plan.amt_per_weight as i128));
            }

            self.commit_weight_updates(sender, &plan);
            acc.weight_sum = plan.weight_sum;
            acc.weight_count = plan.weight_count;

            // Step 7.
            if let Some(start_plan) = self.compute_start(&mut acc, now) {
                self.apply_weight_list_deltas(sender, now, start_plan.end_time, start_plan.amt_per_weight as i128);
            }

            self.senders.insert(sender, &acc);

            if withdraw_amt > 0 && self.env().transfer(sender, withdraw_amt).is_err() {
                // Internal bookkeeping already reflects the new configuration;
                // the sender can retry the withdrawal with a follow-up call.
                return Err(Error::AssetTransferFailed);
            }

            self.env().emit_event(SenderUpdated {
                sender,
                balance: acc.start_balance,
                amt_per_sec: acc.amt_per_sec,
            });

            Ok(withdraw_amt)
        }

        #[ink(message)]
        pub fn get_amt_per_sec(&self, sender: AccountId) -> u128 {
            self.senders.get(sender).unwrap_or_default().amt_per_sec
        }

        /// The balance a sender would get back right now if they withdrew
        /// everything, without actually touching the stream.
        #[ink(message)]
        pub fn withdrawable(&self, sender: AccountId) -> u128 {
            let mut acc = self.senders.get(sender).unwrap_or_default();
            self.compute_stop(&mut acc, self.now());
            acc.start_balance
        }

        #[ink(message)]
        pub fn get_all_receivers(&self, sender: AccountId) -> Vec<(AccountId, u32, u32)> {
            let mut out = Vec::new();
            let mut cur = ROOT;
            loop {
                let (next, _hint, rw, pw) = self.next_weight(sender, cur, ROOT);
                if next == ROOT {
                    break;
                }
                out.push((next, rw, pw));
                cur = next;
            }
            out
        }

        // ===== Proxy-facing reconfiguration (suspend/resume bracket) =====

        /// Replaces zero or more of the caller's receiver weights. Entries not
        /// mentioned keep their current weight. The resulting set must sum to
        /// exactly `PROXY_WEIGHTS_SUM` and contain at most
        /// `PROXY_WEIGHTS_COUNT_MAX` receivers.
        #[ink(message)]
        pub fn set_proxy_weights(&mut self, updates: Vec<(AccountId, u32)>) -> Result<(), Error> {
            let proxy = self.env().caller();
            let now = self.now();

            let old_receivers = self.collect_proxy_receivers(proxy);

            let mut new_receivers = old_receivers.clone();
            for &(addr, w) in updates.iter() {
                if addr == ROOT || addr == END {
                    return Err(Error::InvalidAddress);
                }
                if let Some(pos) = new_receivers.iter().position(|&(a, _)| a == addr) {
                    if w == 0 {
                        new_receivers.remove(pos);
                    } else {
                        new_receivers[pos].1 = w;
                    }
                } else if w > 0 {
                    new_receivers.push((addr, w));
                }
            }
            if new_receivers.len() as u32 > PROXY_WEIGHTS_COUNT_MAX {
                return Err(Error::ProxyTooManyReceivers);
            }
            let mut sum: u64 = 0;
            for &(_, w) in &new_receivers {
                sum = sum.checked_add(w as u64).ok_or(Error::ProxyBadSum)?;
            }
            if sum != PROXY_WEIGHTS_SUM as u64 {
                return Err(Error::ProxyBadSum);
            }

            let current_cycle = now / self.cycle_secs;
            let (running_total, future) = self.drain_proxy_deltas(proxy, current_cycle);

            // Suspend: undo this proxy's outstanding projection under the old set.
            self.apply_proxy_snapshot(&old_receivers, now, &future, running_total, -1);

            for &(addr, w) in updates.iter() {
                self.set_proxy_receiver_weight(proxy, addr, w);
            }
            let mut pacc = self.proxies.get(proxy).unwrap_or_default();
            pacc.configured = true;
            pacc.weight_sum = sum as u32;
            pacc.weight_count = new_receivers.len() as u32;
            self.proxies.insert(proxy, &pacc);

            // Resume: reapply under the new set.
            self.apply_proxy_snapshot(&new_receivers, now, &future, running_total, 1);

            // Fold the settled rate back into the proxy's own log at
            // `current_cycle` so a later reconfiguration can drain it again.
            if running_total != 0 {
                self.proxy_delta_link_if_new(proxy, current_cycle);
                let mut entry = self.proxy_deltas.get((proxy, current_cycle)).unwrap_or_default();
                entry.next_cycle += running_total;
                self.proxy_deltas.insert((proxy, current_cycle), &entry);
            }

            for &(addr, w) in updates.iter() {
                if w > 0 {
                    self.ensure_receiver_initialised(addr, now);
                }
                self.env().emit_event(ProxyToReceiverUpdated { proxy, receiver: addr, receiver_weight: w });
            }

            Ok(())
        }

        #[ink(message)]
        pub fn get_proxy_weights(&self, proxy: AccountId) -> Vec<(AccountId, u32)> {
            let mut out = Vec::new();
            let mut cur = ROOT;
            loop {
                let (next, _hint, rw) = self.next_proxy_weight(proxy, cur, ROOT);
                if next == ROOT {
                    break;
                }
                out.push((next, rw));
                cur = next;
            }
            out
        }

        // ===== Receiver-facing collection =====

        #[ink(message)]
        pub fn collectable(&self, receiver: AccountId) -> u128 {
            self.collectable_amount(receiver, self.now())
        }

        /// Transfers everything currently collectable to the caller.
        #[ink(message)]
        pub fn collect(&mut self) -> Result<u128, Error> {
            let receiver = self.env().caller();
            let now = self.now();
            let amount = self.collectable_amount(receiver, now);
            if amount == 0 {
                return Ok(0);
            }
            if self.env().transfer(receiver, amount).is_err() {
                return Err(Error::AssetTransferFailed);
            }
            self.collect_amount(receiver, now);
            self.env().emit_event(Collected { receiver, amount });
            Ok(amount)
        }

        fn now(&self) -> u64 {
            self.env().block_timestamp()
        }

        // ===== Streaming arithmetic =====

        fn is_active(&self, acc: &SenderAccount) -> bool {
            if acc.weight_sum == 0 {
                return false;
            }
            let ws = acc.weight_sum as u128;
            if acc.amt_per_sec < ws {
                return false;
            }
            acc.start_balance >= acc.amt_per_sec - (acc.amt_per_sec % ws)
        }

        /// Debits `acc.start_balance` for the runtime already elapsed and
        /// returns the removal plan to apply once validation clears, or
        /// `None` if the sender wasn't streaming.
        fn compute_stop(&self, acc: &mut SenderAccount, now: u64) -> Option<StreamPlan> {
            if !self.is_active(acc) {
                return None;
            }
            let ws = acc.weight_sum as u128;
            let amt_per_weight = acc.amt_per_sec / ws;
            let actual_amt_per_sec = amt_per_weight * ws;
            let seconds = acc.start_balance / actual_amt_per_sec;
            let end_time_uncapped = acc.start_time as u128 + seconds;
            let end_time = end_time_uncapped.min(MAX_TIMESTAMP as u128) as u64;
            if end_time <= now {
                acc.start_balance %= actual_amt_per_sec;
                return None;
            }
            let elapsed = now.saturating_sub(acc.start_time) as u128;
            acc.start_balance = acc.start_balance.saturating_sub(elapsed * actual_amt_per_sec);
            Some(StreamPlan { end_time, amt_per_weight })
        }

        /// Symmetric to `compute_stop`: sets `acc.start_time = now` and
        /// returns the addition plan to apply once committed, or `None` if
        /// the sender isn't active under its (possibly just-updated) rate.
        fn compute_start(&self, acc: &mut SenderAccount, now: u64) -> Option<StreamPlan> {
            acc.start_time = now;
            if !self.is_active(acc) {
                return None;
            }
            let ws = acc.weight_sum as u128;
            let amt_per_weight = acc.amt_per_sec / ws;
            let actual_amt_per_sec = amt_per_weight * ws;
            let seconds = acc.start_balance / actual_amt_per_sec;
            let end_time_uncapped = now as u128 + seconds;
            let end_time = end_time_uncapped.min(MAX_TIMESTAMP as u128) as u64;
            if end_time <= now {
                return None;
            }
            Some(StreamPlan { end_time, amt_per_weight })
        }

        /// Walks the sender's current weight list (pruning dead entries as it
        /// goes) and, for every live entry, projects `amt_per_weight * weight`
        /// onto the receiver or proxy it names over `[now, end_time)`.
        fn apply_weight_list_deltas(&mut self, sender: AccountId, now: u64, end_time: u64, amt_per_weight: i128) {
            let mut cur = ROOT;
            loop {
                let (next, _hint, rw, pw) = self.next_weight_pruning(sender, cur, ROOT);
                if next == ROOT {
                    break;
                }
                if rw > 0 {
                    let d = amt_per_weight * rw as i128;
                    self.project_delta_to_receiver(next, now, now, d);
                    self.project_delta_to_receiver(next, now, end_time, -d);
                    self.env().emit_event(SenderToReceiverUpdated { sender, receiver: next, receiver_weight: rw });
                }
                if pw > 0 {
                    let d_per_weight = amt_per_weight * pw as i128;
                    self.project_to_proxy(next, now, end_time, d_per_weight);
                    self.env().emit_event(SenderToProxyUpdated { sender, proxy: next, proxy_weight: pw });
                }
                cur = next;
            }
        }

        /// Splits amplitude `d` at instant `t` into the two-cycle delta pair
        /// and folds it into `receiver`'s ledger. A positive `d` initialises
        /// the receiver if this is its first ever positive delta.
        fn project_delta_to_receiver(&mut self, receiver: AccountId, now: u64, t: u64, d: i128) {
            if d == 0 {
                return;
            }
            if d > 0 {
                self.ensure_receiver_initialised(receiver, now);
            }
            let cycle = t / self.cycle_secs;
            let into = (t % self.cycle_secs) as i128;
            let rem = self.cycle_secs as i128 - into;
            let mut entry = self.receiver_deltas.get((receiver, cycle)).unwrap_or_default();
            entry.this_cycle += rem * d;
            entry.next_cycle += into * d;
            self.receiver_deltas.insert((receiver, cycle), &entry);
        }

        /// Projects a sender's contribution onto a proxy: records it in the
        /// proxy's own delta log at the per-weight-point rate, and recurses
        /// once into the proxy's current receiver list at that same rate.
        fn project_to_proxy(&mut self, proxy: AccountId, now: u64, end_time: u64, d_per_weight: i128) {
            if d_per_weight == 0 {
                return;
            }
            let per_unit = d_per_weight / PROXY_WEIGHTS_SUM as i128;
            self.add_to_proxy_delta_split(proxy, now, per_unit);
            self.add_to_proxy_delta_split(proxy, end_time, -per_unit);

            let mut cur = ROOT;
            loop {
                let (next, _hint, rw) = self.next_proxy_weight_pruning(proxy, cur, ROOT);
                if next == ROOT {
                    break;
                }
                if rw > 0 {
                    let amt = per_unit * rw as i128;
                    self.project_delta_to_receiver(next, now, now, amt);
                    self.project_delta_to_receiver(next, now, end_time, -amt);
                }
                cur = next;
            }
        }

        // ===== Sender weight list =====

        fn sender_weight_get_node(&self, owner: AccountId, addr: AccountId) -> SenderWeightNode {
            self.sender_weights.get((owner, addr)).unwrap_or_default()
        }

        fn sender_weight_link_if_new(&mut self, owner: AccountId, addr: AccountId) {
            if self.sender_weights.get((owner, addr)).is_none() {
                let mut head = self.sender_weight_get_node(owner, ROOT);
                let node = SenderWeightNode { receiver_weight: 0, proxy_weight: 0, next: head.next };
                self.sender_weights.insert((owner, addr), &node);
                head.next = addr;
                self.sender_weights.insert((owner, ROOT), &head);
            }
        }

        /// Sets `addr`'s receiver weight for `owner`, returning the previous
        /// value. Rejects the reserved `ROOT`/`END` sentinels.
        pub fn set_receiver_weight(&mut self, owner: AccountId, addr: AccountId, w: u32) -> Result<u32, Error> {
            if addr == ROOT || addr == END {
                return Err(Error::InvalidAddress);
            }
            self.sender_weight_link_if_new(owner, addr);
            let mut node = self.sender_weight_get_node(owner, addr);
            let prev = node.receiver_weight;
            node.receiver_weight = w;
            self.sender_weights.insert((owner, addr), &node);
            Ok(prev)
        }

        /// Sets `addr`'s proxy weight for `owner`, returning the previous
        /// value. Rejects the reserved `ROOT`/`END` sentinels.
        pub fn set_proxy_weight(&mut self, owner: AccountId, addr: AccountId, w: u32) -> Result<u32, Error> {
            if addr == ROOT || addr == END {
                return Err(Error::InvalidAddress);
            }
            self.sender_weight_link_if_new(owner, addr);
            let mut node = self.sender_weight_get_node(owner, addr);
            let prev = node.proxy_weight;
            node.proxy_weight = w;
            self.sender_weights.insert((owner, addr), &node);
            Ok(prev)
        }

        /// Advances past `cur`, unlinking any zero-weight entries found along
        /// the way, and returns the next live entry (or `ROOT` if exhausted).
        pub fn next_weight_pruning(
            &mut self,
            owner: AccountId,
            cur: AccountId,
            hint: AccountId,
        ) -> (AccountId, AccountId, u32, u32) {
            let mut cur_node = self.sender_weight_get_node(owner, cur);
            loop {
                let next = cur_node.next;
                if next == END {
                    return (ROOT, hint, 0, 0);
                }
                let next_node = self.sender_weight_get_node(owner, next);
                if next_node.is_zeroed() {
                    cur_node.next = next_node.next;
                    self.sender_weights.insert((owner, cur), &cur_node);
                    self.sender_weights.remove((owner, next));
                    continue;
                }
                return (next, next, next_node.receiver_weight, next_node.proxy_weight);
            }
        }

        /// Read-only counterpart of `next_weight_pruning`: skips zero-weight
        /// entries without unlinking them.
        pub fn next_weight(&self, owner: AccountId, cur: AccountId, hint: AccountId) -> (AccountId, AccountId, u32, u32) {
            let mut cur_addr = cur;
            loop {
                let cur_node = self.sender_weight_get_node(owner, cur_addr);
                let next = cur_node.next;
                if next == END {
                    return (ROOT, hint, 0, 0);
                }
                let next_node = self.sender_weight_get_node(owner, next);
                if next_node.is_zeroed() {
                    cur_addr = next;
                    continue;
                }
                return (next, next, next_node.receiver_weight, next_node.proxy_weight);
            }
        }

        pub fn is_zeroed(&self, owner: AccountId) -> bool {
            self.next_weight(owner, ROOT, ROOT).0 == ROOT
        }

        fn overlay_field(&self, sender: AccountId, ops: &[WeightOp], addr: AccountId, is_proxy: bool) -> u32 {
            for op in ops.iter().rev() {
                if op.addr == addr && op.is_proxy == is_proxy {
                    return op.weight;
                }
            }
            let node = self.sender_weight_get_node(sender, addr);
            if is_proxy {
                node.proxy_weight
            } else {
                node.receiver_weight
            }
        }

        /// Validates an entire batch of receiver/proxy weight updates against
        /// a running `weight_sum`/`weight_count` without touching storage,
        /// so a rejected batch never leaves a partial mutation behind.
        fn validate_weight_updates(
            &self,
            sender: AccountId,
            acc: &SenderAccount,
            receiver_weights: &[(AccountId, u32)],
            proxy_weights: &[(AccountId, u32)],
        ) -> Result<WeightUpdatePlan, Error> {
            let mut ops: Vec<WeightOp> = Vec::new();
            let mut weight_sum = acc.weight_sum;
            let mut weight_count = acc.weight_count;

            for &(addr, w) in receiver_weights {
                if addr == ROOT || addr == END {
                    return Err(Error::InvalidAddress);
                }
                let prev = self.overlay_field(sender, &ops, addr, false);
                if prev == 0 && w > 0 {
                    weight_count =
                        weight_count.checked_add(1).filter(|c| *c <= SENDER_WEIGHTS_COUNT_MAX).ok_or(Error::TooManyReceivers)?;
                } else if prev > 0 && w == 0 {
                    weight_count = weight_count.saturating_sub(1);
                }
                let new_sum = weight_sum as i64 - prev as i64 + w as i64;
                if new_sum < 0 || new_sum as u32 > SENDER_WEIGHTS_SUM_MAX {
                    return Err(Error::WeightSumOverflow);
                }
                weight_sum = new_sum as u32;
                ops.push(WeightOp { addr, is_proxy: false, weight: w });
            }

            for &(addr, w) in proxy_weights {
                if addr == ROOT || addr == END {
                    return Err(Error::InvalidAddress);
                }
                let configured = self.proxies.get(addr).map(|p| p.configured).unwrap_or(false);
                if !configured {
                    return Err(Error::ProxyMissing);
                }
                if w % PROXY_WEIGHTS_SUM != 0 {
                    return Err(Error::ProxyWeightNotMultiple);
                }
                let prev = self.overlay_field(sender, &ops, addr, true);
                if prev == 0 && w > 0 {
                    weight_count = weight_count
                        .checked_add(PROXY_WEIGHTS_COUNT_MAX)
                        .filter(|c| *c <= SENDER_WEIGHTS_COUNT_MAX)
                        .ok_or(Error::TooManyReceivers)?;
                } else if prev > 0 && w == 0 {
                    weight_count = weight_count.saturating_sub(PROXY_WEIGHTS_COUNT_MAX);
                }
                let new_sum = weight_sum as i64 - prev as i64 + w as i64;
                if new_sum < 0 || new_sum as u32 > SENDER_WEIGHTS_SUM_MAX {
                    return Err(Error::WeightSumOverflow);
                }
                weight_sum = new_sum as u32;
                ops.push(WeightOp { addr, is_proxy: true, weight: w });
            }

            Ok(WeightUpdatePlan { ops, weight_sum, weight_count })
        }

        fn commit_weight_updates(&mut self, sender: AccountId, plan: &WeightUpdatePlan) {
            for op in &plan.ops {
                if op.is_proxy {
                    let _ = self.set_proxy_weight(sender, op.addr, op.weight);
                } else {
                    let _ = self.set_receiver_weight(sender, op.addr, op.weight);
                }
            }
        }

        // ===== Proxy delta log =====

        fn proxy_delta_link_if_new(&mut self, proxy: AccountId, cycle: u64) {
            if self.proxy_deltas.get((proxy, cycle)).is_none() {
                let mut head = self.proxy_deltas.get((proxy, ROOT_CYCLE)).unwrap_or_default();
                let node = ProxyDeltaNode { this_cycle: 0, next_cycle: 0, next: head.next };
                self.proxy_deltas.insert((proxy, cycle), &node);
                head.next = cycle;
                self.proxy_deltas.insert((proxy, ROOT_CYCLE), &head);
            }
        }

        /// Adds `(d_this, d_next)` to `proxy`'s delta log at `cycle`.
        /// `cycle` must lie strictly between `ROOT_CYCLE` and `END_CYCLE`.
        pub fn add_to_proxy_delta(&mut self, proxy: AccountId, cycle: u64, d_this: i128, d_next: i128) -> Result<(), Error> {
            if cycle == ROOT_CYCLE || cycle == END_CYCLE {
                return Err(Error::InvalidCycle);
            }
            self.proxy_delta_link_if_new(proxy, cycle);
            let mut node = self.proxy_deltas.get((proxy, cycle)).unwrap_or_default();
            node.this_cycle += d_this;
            node.next_cycle += d_next;
            self.proxy_deltas.insert((proxy, cycle), &node);
            Ok(())
        }

        /// Splits amplitude `d` at instant `t` into the two-cycle pair and
        /// folds it into the proxy's own delta log.
        fn add_to_proxy_delta_split(&mut self, proxy: AccountId, t: u64, d: i128) {
            if d == 0 {
                return;
            }
            let cycle = t / self.cycle_secs;
            let into = (t % self.cycle_secs) as i128;
            let rem = self.cycle_secs as i128 - into;
            // cycle 0 is unreachable in practice: real chain timestamps are
            // always well past one `cycle_secs` by the time a stream starts.
            let _ = self.add_to_proxy_delta(proxy, cycle, rem * d, into * d);
        }

        /// Advances past `cur`, unlinking any zero entry found along the way,
        /// returning the next live one (or `ROOT_CYCLE` if exhausted).
        pub fn next_delta_pruning(&mut self, proxy: AccountId, cur: u64, hint: u64) -> (u64, u64, i128, i128) {
            let mut cur_cycle = cur;
            loop {
                let cur_node = self.proxy_deltas.get((proxy, cur_cycle)).unwrap_or_default();
                let next = cur_node.next;
                if next == END_CYCLE {
                    return (ROOT_CYCLE, hint, 0, 0);
                }
                let next_node = self.proxy_deltas.get((proxy, next)).unwrap_or_default();
                if next_node.is_zeroed() {
                    let mut updated = cur_node;
                    updated.next = next_node.next;
                    self.proxy_deltas.insert((proxy, cur_cycle), &updated);
                    self.proxy_deltas.remove((proxy, next));
                    continue;
                }
                return (next, next, next_node.this_cycle, next_node.next_cycle);
            }
        }

        /// Walks `proxy`'s own delta log once, folding every already-finished
        /// entry (`cycle < current_cycle`) into a single running per-cycle
        /// rate (the steady amount, per weight point, that recurs every full
        /// cycle from here on) and unlinking it, since its one-off
        /// `this_cycle` contribution has already settled into history and a
        /// reconfiguration has nothing left to redirect there. Entries at or
        /// after `current_cycle` are still "in flight" and are returned
        /// as-is for the caller to replay verbatim.
        fn drain_proxy_deltas(&mut self, proxy: AccountId, current_cycle: u64) -> (i128, Vec<(u64, i128, i128)>) {
            let mut running_total: i128 = 0;
            let mut future = Vec::new();
            let mut cur = ROOT_CYCLE;
            loop {
                let cur_node = self.proxy_deltas.get((proxy, cur)).unwrap_or_default();
                let next = cur_node.next;
                if next == END_CYCLE {
                    break;
                }
                let next_node = self.proxy_deltas.get((proxy, next)).unwrap_or_default();
                if next < current_cycle {
                    running_total += next_node.this_cycle + next_node.next_cycle;
                    let mut updated = cur_node;
                    updated.next = next_node.next;
                    self.proxy_deltas.insert((proxy, cur), &updated);
                    self.proxy_deltas.remove((proxy, next));
                    continue;
                }
                future.push((next, next_node.this_cycle, next_node.next_cycle));
                cur = next;
            }
            (running_total, future)
        }

        /// Undoes (`multiplier = -1`) or reapplies (`multiplier = 1`) a
        /// proxy's outstanding delta log against a snapshot of its receiver
        /// list: every still-in-flight logged entry is rescaled by each
        /// receiver's weight and replayed verbatim, and the steady rate
        /// already established by history (`running_total`, per weight
        /// point per cycle) is split exactly the way a fresh stream would be
        /// stopped or started at `now` — the elapsed slice of the current
        /// cycle keeps its old claim, the remainder (and every cycle after)
        /// goes to whichever set is being applied.
        fn apply_proxy_snapshot(
            &mut self,
            receivers: &[(AccountId, u32)],
            now: u64,
            future: &[(u64, i128, i128)],
            running_total: i128,
            multiplier: i128,
        ) {
            for &(cycle, d_this, d_next) in future {
                for &(receiver, rw) in receivers {
                    if rw == 0 {
                        continue;
                    }
                    let this_amt = d_this * rw as i128 * multiplier;
                    let next_amt = d_next * rw as i128 * multiplier;
                    if this_amt != 0 || next_amt != 0 {
                        let mut entry = self.receiver_deltas.get((receiver, cycle)).unwrap_or_default();
                        entry.this_cycle += this_amt;
                        entry.next_cycle += next_amt;
                        self.receiver_deltas.insert((receiver, cycle), &entry);
                    }
                }
            }

            if running_total == 0 {
                return;
            }
            // `running_total` is an exact multiple of `cycle_secs`: it is the
            // sum of per-cycle amounts each already folded through a full
            // cycle by `drain_proxy_deltas`.
            let per_sec = running_total / self.cycle_secs as i128;
            let cycle = now / self.cycle_secs;
            let into = (now % self.cycle_secs) as i128;
            let rem = self.cycle_secs as i128 - into;
            for &(receiver, rw) in receivers {
                if rw == 0 {
                    continue;
                }
                let d = per_sec * rw as i128 * multiplier;
                let mut entry = self.receiver_deltas.get((receiver, cycle)).unwrap_or_default();
                entry.this_cycle += rem * d;
                entry.next_cycle += into * d;
                self.receiver_deltas.insert((receiver, cycle), &entry);
            }
        }

        // ===== Proxy's own weight list (reused per-proxy) =====

        fn proxy_weight_link_if_new(&mut self, proxy: AccountId, addr: AccountId) {
            if self.proxy_weights.get((proxy, addr)).is_none() {
                let mut head = self.proxy_weights.get((proxy, ROOT)).unwrap_or_default();
                let node = ProxyWeightNode { receiver_weight: 0, next: head.next };
                self.proxy_weights.insert((proxy, addr), &node);
                head.next = addr;
                self.proxy_weights.insert((proxy, ROOT), &head);
            }
        }

        fn set_proxy_receiver_weight(&mut self, proxy: AccountId, addr: AccountId, w: u32) -> u32 {
            self.proxy_weight_link_if_new(proxy, addr);
            let mut node = self.proxy_weights.get((proxy, addr)).unwrap_or_default();
            let prev = node.receiver_weight;
            node.receiver_weight = w;
            self.proxy_weights.insert((proxy, addr), &node);
            prev
        }

        pub fn next_proxy_weight_pruning(
            &mut self,
            proxy: AccountId,
            cur: AccountId,
            hint: AccountId,
        ) -> (AccountId, AccountId, u32) {
            let mut cur_node = self.proxy_weights.get((proxy, cur)).unwrap_or_default();
            loop {
                let next = cur_node.next;
                if next == END {
                    return (ROOT, hint, 0);
                }
                let next_node = self.proxy_weights.get((proxy, next)).unwrap_or_default();
                if next_node.is_zeroed() {
                    cur_node.next = next_node.next;
                    self.proxy_weights.insert((proxy, cur), &cur_node);
                    self.proxy_weights.remove((proxy, next));
                    continue;
                }
                return (next, next, next_node.receiver_weight);
            }
        }

        pub fn next_proxy_weight(&self, proxy: AccountId, cur: AccountId, hint: AccountId) -> (AccountId, AccountId, u32) {
            let mut cur_addr = cur;
            loop {
                let cur_node = self.proxy_weights.get((proxy, cur_addr)).unwrap_or_default();
                let next = cur_node.next;
                if next == END {
                    return (ROOT, hint, 0);
                }
                let next_node = self.proxy_weights.get((proxy, next)).unwrap_or_default();
                if next_node.is_zeroed() {
                    cur_addr = next;
                    continue;
                }
                return (next, next, next_node.receiver_weight);
            }
        }

        fn collect_proxy_receivers(&mut self, proxy: AccountId) -> Vec<(AccountId, u32)> {
            let mut out = Vec::new();
            let mut cur = ROOT;
            loop {
                let (next, _hint, rw) = self.next_proxy_weight_pruning(proxy, cur, ROOT);
                if next == ROOT {
                    break;
                }
                out.push((next, rw));
                cur = next;
            }
            out
        }

        // ===== Receiver ledger =====

        /// A receiver's `next_collected_cycle` is pinned to the cycle containing
        /// the instant of its first ever positive delta, so that cycle's own
        /// `this_cycle` contribution (the remaining seconds of that cycle) is
        /// not skipped. Cycle `0` is unreachable in practice (real chain
        /// timestamps are always past one `cycle_secs`), so it cannot be
        /// confused with the "never initialised" sentinel.
        fn ensure_receiver_initialised(&mut self, receiver: AccountId, now: u64) {
            let mut acc = self.receivers.get(receiver).unwrap_or_default();
            if !acc.is_initialised() {
                acc.next_collected_cycle = now / self.cycle_secs;
                self.receivers.insert(receiver, &acc);
            }
        }

        /// Walks every finished cycle since the receiver's last collection,
        /// carrying a running per-cycle rate forward: `this_cycle` folds in
        /// before a cycle is counted, `next_cycle` folds in after, so the
        /// rate a delta establishes keeps recurring until a later delta
        /// changes it.
        fn collectable_amount(&self, receiver: AccountId, now: u64) -> u128 {
            let acc = self.receivers.get(receiver).unwrap_or_default();
            if !acc.is_initialised() {
                return 0;
            }
            let current_cycle = now / self.cycle_secs;
            let Some(finished) = current_cycle.checked_sub(1) else {
                return 0;
            };
            if acc.next_collected_cycle > finished {
                return 0;
            }
            let mut rate = acc.last_funds_per_cycle;
            let mut collected: i128 = 0;
            let mut c = acc.next_collected_cycle;
            while c <= finished {
                let delta = self.receiver_deltas.get((receiver, c)).unwrap_or_default();
                rate += delta.this_cycle;
                collected += rate;
                rate += delta.next_cycle;
                c += 1;
            }
            collected.max(0) as u128
        }

        fn collect_amount(&mut self, receiver: AccountId, now: u64) -> u128 {
            let mut acc = self.receivers.get(receiver).unwrap_or_default();
            if !acc.is_initialised() {
                return 0;
            }
            let current_cycle = now / self.cycle_secs;
            let Some(finished) = current_cycle.checked_sub(1) else {
                return 0;
            };
            if acc.next_collected_cycle > finished {
                return 0;
            }
            let mut rate = acc.last_funds_per_cycle;
            let mut collected: i128 = 0;
            let mut c = acc.next_collected_cycle;
            while c <= finished {
                let delta = self.receiver_deltas.get((receiver, c)).unwrap_or_default();
                rate += delta.this_cycle;
                collected += rate;
                rate += delta.next_cycle;
                self.receiver_deltas.remove((receiver, c));
                c += 1;
            }
            acc.last_funds_per_cycle = rate;
            acc.next_collected_cycle = finished + 1;
            self.receivers.insert(receiver, &acc);
            collected.max(0) as u128
        }
    }

}

//! Producer votes, proxies and vote weight propagation

use super::ResourceSystem;
use crate::asset::add_i64;
use crate::error::ensure;
use crate::host::Host;
use crate::types::AccountName;
use crate::voting::{add_weight, ProducerInfo, VoteWeight, VoterInfo};
use crate::{Error, Result};
use tracing::{debug, info};

impl<H: Host> ResourceSystem<H> {
    /// Register `producer` as a vote target, or reactivate it
    pub fn register_producer(&mut self, producer: &AccountName) -> Result<()> {
        self.transact("regproducer", |sys| {
            sys.state
                .producers
                .entry(producer.clone())
                .and_modify(|p| p.is_active = true)
                .or_insert_with(|| ProducerInfo {
                    owner: producer.clone(),
                    total_votes: 0,
                    is_active: true,
                });
            info!(%producer, "producer registered");
            Ok(())
        })
    }

    /// Stop accepting new votes for `producer`
    ///
    /// Existing voters keep their weight on it.
    pub fn unregister_producer(&mut self, producer: &AccountName) -> Result<()> {
        self.transact("unregprod", |sys| {
            let info = sys
                .state
                .producers
                .get_mut(producer)
                .ok_or_else(|| Error::precondition("producer not found"))?;
            info.is_active = false;
            info!(%producer, "producer unregistered");
            Ok(())
        })
    }

    /// Register or unregister `proxy` as a vote proxy
    pub fn register_proxy(&mut self, proxy: &AccountName, is_proxy: bool) -> Result<()> {
        self.transact("regproxy", |sys| {
            sys.run_vote_stake_hooks(proxy)?;
            match sys.state.voters.get_mut(proxy) {
                Some(info) => {
                    ensure(info.is_proxy != is_proxy, "action has no effect")?;
                    ensure(
                        info.proxy.is_none(),
                        "account that uses a proxy is not allowed to become a proxy",
                    )?;
                    info.is_proxy = is_proxy;
                }
                None => {
                    ensure(is_proxy, "action has no effect")?;
                    let mut info = VoterInfo::new(proxy.clone());
                    info.is_proxy = true;
                    sys.state.voters.insert(proxy.clone(), info);
                }
            }
            sys.propagate_weight_change(proxy)?;
            info!(%proxy, is_proxy, "proxy registration changed");
            Ok(())
        })
    }

    /// Point the voter's weight at `producers`, or at `proxy`
    ///
    /// `producers` must be sorted, unique and registered. An empty list
    /// without a proxy withdraws the vote.
    pub fn vote_producer(
        &mut self,
        voter: &AccountName,
        proxy: Option<AccountName>,
        producers: Vec<AccountName>,
    ) -> Result<()> {
        self.transact("voteproducer", |sys| {
            sys.run_vote_stake_hooks(voter)?;
            sys.check_vote(voter, proxy.as_ref(), &producers)?;

            let (old_proxy, old_producers, last) = {
                let info = sys
                    .state
                    .voters
                    .get(voter)
                    .ok_or_else(|| Error::inconsistent("voter vanished"))?;
                (info.proxy.clone(), info.producers.clone(), info.last_vote_weight)
            };
            match old_proxy {
                Some(old) => {
                    let old_info = sys
                        .state
                        .voters
                        .get_mut(&old)
                        .ok_or_else(|| Error::inconsistent(format!("proxy {} missing", old)))?;
                    old_info.proxied_vote_weight =
                        add_weight(old_info.proxied_vote_weight, -last, "proxied vote weight")?;
                    sys.propagate_weight_change(&old)?;
                }
                None => sys.apply_producer_delta(&old_producers, -last)?,
            }

            if let Some(info) = sys.state.voters.get_mut(voter) {
                info.proxy = proxy.clone();
                info.producers = producers.clone();
                info.last_vote_weight = 0;
            }
            sys.propagate_weight_change(voter)?;
            info!(%voter, proxy = ?proxy, producers = producers.len(), "vote cast");
            Ok(())
        })
    }

    /// Add `delta` to the voter's counted stake and push the new weight
    /// downstream; the voter record is created on first stake
    pub(crate) fn update_voting_power(&mut self, voter: &AccountName, delta: i64) -> Result<()> {
        let info = self
            .state
            .voters
            .entry(voter.clone())
            .or_insert_with(|| VoterInfo::new(voter.clone()));
        let staked = add_i64(info.staked, delta, "voter stake")?;
        if staked < 0 {
            return Err(Error::inconsistent(format!(
                "stake for voting of {} cannot be negative",
                voter
            )));
        }
        info.staked = staked;
        self.propagate_weight_change(voter)
    }

    /// Recompute the voter's weight and move its proxy or producers by
    /// the difference to the weight it last contributed
    pub(crate) fn propagate_weight_change(&mut self, voter: &AccountName) -> Result<()> {
        let now = self.now();
        let info = self
            .state
            .voters
            .get(voter)
            .ok_or_else(|| Error::inconsistent(format!("voter {} missing", voter)))?;
        let mut new_weight = self.schedule.weight(info.staked, now);
        if info.is_proxy {
            new_weight = add_weight(new_weight, info.proxied_vote_weight, "vote weight")?;
        }
        let delta = new_weight
            .checked_sub(info.last_vote_weight)
            .ok_or_else(|| Error::ArithmeticOverflow("vote weight delta underflow".to_string()))?;
        let proxy = info.proxy.clone();
        let producers = info.producers.clone();

        if let Some(info) = self.state.voters.get_mut(voter) {
            info.last_vote_weight = new_weight;
        }
        if delta == 0 {
            return Ok(());
        }
        debug!(%voter, %delta, "vote weight changed");

        match proxy {
            Some(proxy) => {
                let proxy_info = self
                    .state
                    .voters
                    .get_mut(&proxy)
                    .ok_or_else(|| Error::inconsistent(format!("proxy {} missing", proxy)))?;
                if proxy_info.proxy.is_some() {
                    return Err(Error::inconsistent(format!(
                        "proxy {} votes through another proxy",
                        proxy
                    )));
                }
                proxy_info.proxied_vote_weight =
                    add_weight(proxy_info.proxied_vote_weight, delta, "proxied vote weight")?;
                self.propagate_weight_change(&proxy)
            }
            None => self.apply_producer_delta(&producers, delta),
        }
    }

    fn apply_producer_delta(&mut self, producers: &[AccountName], delta: VoteWeight) -> Result<()> {
        for producer in producers {
            let info = self
                .state
                .producers
                .get_mut(producer)
                .ok_or_else(|| Error::inconsistent(format!("producer {} missing", producer)))?;
            info.total_votes = add_weight(info.total_votes, delta, "producer votes")?;
            self.state.total_producer_vote_weight = add_weight(
                self.state.total_producer_vote_weight,
                delta,
                "total producer vote weight",
            )?;
        }
        Ok(())
    }

    fn check_vote(
        &self,
        voter: &AccountName,
        proxy: Option<&AccountName>,
        producers: &[AccountName],
    ) -> Result<()> {
        let info = self
            .state
            .voters
            .get(voter)
            .ok_or_else(|| Error::precondition("user must stake before they can vote"))?;

        if let Some(proxy) = proxy {
            ensure(
                producers.is_empty(),
                "cannot vote for producers and proxy at same time",
            )?;
            ensure(proxy != voter, "cannot proxy to self")?;
            ensure(
                !info.is_proxy,
                "account registered as a proxy is not allowed to use a proxy",
            )?;
            let proxy_info = self
                .state
                .voters
                .get(proxy)
                .ok_or_else(|| Error::precondition("invalid proxy specified"))?;
            ensure(proxy_info.is_proxy, "proxy not found")?;
            return Ok(());
        }

        let max = self.config.voting.max_producers;
        ensure(
            producers.len() <= max,
            &format!("attempt to vote for too many producers (max {})", max),
        )?;
        ensure(
            producers.windows(2).all(|pair| pair[0] < pair[1]),
            "producer votes must be unique and sorted",
        )?;
        for producer in producers {
            let registered = self
                .state
                .producers
                .get(producer)
                .ok_or_else(|| {
                    Error::precondition(format!("producer {} is not registered", producer))
                })?;
            ensure(
                registered.is_active,
                &format!("producer {} is not currently registered", producer),
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::testkit::{acct, core, setup, setup_with, test_config, voter, PRODUCER};

    fn votes(sys: &ResourceSystem<crate::host::MemoryHost>, producer: &str) -> VoteWeight {
        sys.producer(&acct(producer)).unwrap().total_votes
    }

    #[test]
    fn test_vote_weight_follows_stake() {
        let mut sys = setup();
        let alice = voter(&mut sys, "alice", 100_0000);
        assert_eq!(votes(&sys, PRODUCER), 1_0000);

        sys.delegate_bandwidth(&alice, &alice, core(2_0000), core(0), false)
            .unwrap();
        assert_eq!(votes(&sys, PRODUCER), 3_0000);

        sys.undelegate_bandwidth(&alice, &alice, core(0), core(5000))
            .unwrap();
        assert_eq!(votes(&sys, PRODUCER), 2_5000);
        assert_eq!(sys.state().total_producer_vote_weight, 2_5000);
    }

    #[test]
    fn test_switching_votes_restores_old_totals() {
        let mut sys = setup();
        let alice = voter(&mut sys, "alice", 100_0000);
        sys.register_producer(&acct("prod.b")).unwrap();

        sys.vote_producer(&alice, None, vec![acct(PRODUCER), acct("prod.b")])
            .unwrap();
        assert_eq!(votes(&sys, PRODUCER), 1_0000);
        assert_eq!(votes(&sys, "prod.b"), 1_0000);
        assert_eq!(sys.state().total_producer_vote_weight, 2_0000);

        sys.vote_producer(&alice, None, vec![acct("prod.b")]).unwrap();
        assert_eq!(votes(&sys, PRODUCER), 0);
        assert_eq!(votes(&sys, "prod.b"), 1_0000);
        assert_eq!(sys.state().total_producer_vote_weight, 1_0000);

        sys.vote_producer(&alice, None, vec![]).unwrap();
        assert_eq!(votes(&sys, "prod.b"), 0);
        assert_eq!(sys.state().total_producer_vote_weight, 0);
    }

    #[test]
    fn test_proxy_carries_weight() {
        let mut sys = setup();
        let bob = voter(&mut sys, "bob", 10_0000);
        sys.register_proxy(&bob, true).unwrap();
        assert_eq!(votes(&sys, PRODUCER), 1_0000);

        let carol = voter(&mut sys, "carol", 10_0000);
        assert_eq!(votes(&sys, PRODUCER), 2_0000);
        sys.vote_producer(&carol, Some(bob.clone()), vec![]).unwrap();
        assert_eq!(votes(&sys, PRODUCER), 2_0000);
        assert_eq!(sys.voter(&bob).unwrap().proxied_vote_weight, 1_0000);

        sys.delegate_bandwidth(&carol, &carol, core(1_0000), core(0), false)
            .unwrap();
        assert_eq!(sys.voter(&bob).unwrap().proxied_vote_weight, 2_0000);
        assert_eq!(votes(&sys, PRODUCER), 3_0000);

        let err = sys.register_proxy(&carol, true).unwrap_err();
        assert!(matches!(err, Error::PreconditionFailed(_)));

        sys.vote_producer(&carol, None, vec![]).unwrap();
        assert_eq!(sys.voter(&bob).unwrap().proxied_vote_weight, 0);
        assert_eq!(votes(&sys, PRODUCER), 1_0000);
        assert_eq!(sys.state().total_producer_vote_weight, 1_0000);
    }

    #[test]
    fn test_vote_validation() {
        let mut config = test_config();
        config.voting.max_producers = 2;
        let mut sys = setup_with(config);
        let alice = voter(&mut sys, "alice", 10_0000);
        let bob = voter(&mut sys, "bob", 10_0000);
        sys.register_producer(&acct("prod.b")).unwrap();
        sys.register_producer(&acct("prod.c")).unwrap();

        let precondition = |r: Result<()>| matches!(r, Err(Error::PreconditionFailed(_)));
        assert!(precondition(sys.vote_producer(
            &alice,
            None,
            vec![acct("prod.b"), acct(PRODUCER)]
        )));
        assert!(precondition(sys.vote_producer(
            &alice,
            None,
            vec![acct(PRODUCER), acct("prod.b"), acct("prod.c")]
        )));
        assert!(precondition(sys.vote_producer(&alice, None, vec![acct("nobody")])));
        assert!(precondition(sys.vote_producer(&alice, Some(alice.clone()), vec![])));
        // bob is not a proxy
        assert!(precondition(sys.vote_producer(&alice, Some(bob.clone()), vec![])));
        sys.register_proxy(&bob, true).unwrap();
        assert!(precondition(sys.vote_producer(
            &alice,
            Some(bob.clone()),
            vec![acct(PRODUCER)]
        )));
        assert!(precondition(sys.vote_producer(&acct("ghost"), None, vec![])));

        sys.unregister_producer(&acct("prod.c")).unwrap();
        assert!(precondition(sys.vote_producer(&alice, None, vec![acct("prod.c")])));
        assert!(precondition(sys.unregister_producer(&acct("nobody"))));
    }

    #[test]
    fn test_inactive_producer_keeps_stake_deltas() {
        let mut sys = setup();
        let alice = voter(&mut sys, "alice", 10_0000);
        sys.unregister_producer(&acct(PRODUCER)).unwrap();
        sys.delegate_bandwidth(&alice, &alice, core(1_0000), core(0), false)
            .unwrap();
        assert_eq!(votes(&sys, PRODUCER), 2_0000);
        assert!(!sys.producer(&acct(PRODUCER)).unwrap().is_active);

        sys.register_producer(&acct(PRODUCER)).unwrap();
        assert!(sys.producer(&acct(PRODUCER)).unwrap().is_active);
        assert_eq!(votes(&sys, PRODUCER), 2_0000);
    }

    #[test]
    fn test_weighted_stake_round_trip_is_exact() {
        use crate::time::{TimePoint, SECONDS_PER_WEEK};
        use crate::voting::DoublingSchedule;

        // 2^(1/52): every weight is fractional before truncation
        let mut sys = setup().with_schedule(DoublingSchedule {
            epoch: TimePoint::from_secs(10 * 86_400 + 3_600 - SECONDS_PER_WEEK),
            doubling_weeks: 52,
        });
        let voters: Vec<AccountName> = ["a1", "a2", "a3", "a4", "a5"]
            .iter()
            .map(|name| voter(&mut sys, name, 2_000_0000))
            .collect();
        assert_eq!(votes(&sys, PRODUCER), 5 * 1_0134);

        let before = (votes(&sys, PRODUCER), sys.state().total_producer_vote_weight);
        for amount in [1, 99_9999, 1_234_5671, 1_999_9999] {
            sys.delegate_bandwidth(&voters[2], &voters[2], core(amount), core(0), false)
                .unwrap();
            assert_ne!(votes(&sys, PRODUCER), before.0);
            sys.undelegate_bandwidth(&voters[2], &voters[2], core(amount), core(0))
                .unwrap();
            assert_eq!(
                (votes(&sys, PRODUCER), sys.state().total_producer_vote_weight),
                before
            );
        }
    }

    #[test]
    fn test_register_proxy_without_effect() {
        let mut sys = setup();
        let dave = acct("dave");
        assert!(sys.register_proxy(&dave, false).is_err());
        sys.register_proxy(&dave, true).unwrap();
        assert!(sys.register_proxy(&dave, true).is_err());
        sys.register_proxy(&dave, false).unwrap();
        assert!(!sys.voter(&dave).unwrap().is_proxy);
    }
}

//! Relay robustness: concurrency, delivery failures, duplicates, ordering.

use std::sync::Arc;

use warptoad_bridge::{
    BridgeError, LedgerEvent, MessengerSettings, MintRequest, NativeWitnessBackend, RelayRound,
    RelayState, Relayer, RelayerSettings,
};
use warptoad_core::{CommitmentPreimage, PoseidonHasher, WarpToadError};
use warptoad_test_fixtures::{
    canonical_quote, fast_relayer_settings, first_burn, fund_and_burn, l1_and_l2, l1_and_l2_with,
    l1_only, random_burn,
    recipient, second_burn, sender, Sandbox, L1_CHAIN_ID, L2_CHAIN_ID, MAX_FEE,
    SECOND_L2_CHAIN_ID,
};

fn request(burn_chain: u64, preimage: CommitmentPreimage) -> MintRequest {
    MintRequest {
        burn_chain,
        preimage,
        recipient: recipient(),
        quote: canonical_quote(),
    }
}

#[tokio::test(start_paused = true)]
async fn concurrent_mints_pay_out_once() {
    let sandbox = l1_only();
    let preimage = first_burn(L1_CHAIN_ID);
    fund_and_burn(&sandbox.network, L1_CHAIN_ID, sender(), &preimage)
        .await
        .unwrap();
    sandbox
        .relayer
        .bridge_round(&[L1_CHAIN_ID], &[L1_CHAIN_ID])
        .await
        .unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let relayer = Arc::clone(&sandbox.relayer);
            let request = request(L1_CHAIN_ID, preimage.clone());
            tokio::spawn(async move { relayer.mint(&request).await })
        })
        .collect();

    let mut paid = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => paid += 1,
            Err(BridgeError::NullifierAlreadySpent(_)) => rejected += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!((paid, rejected), (1, 3));

    let ledger = sandbox.network.ledger(L1_CHAIN_ID).unwrap();
    let ledger = ledger.lock().await;
    let minted = ledger
        .journal()
        .iter()
        .filter(|entry| matches!(entry.event, LedgerEvent::Minted { .. }))
        .count();
    assert_eq!(minted, 1);
    assert!(ledger.balance_of(&recipient()) <= preimage.amount);
}

#[tokio::test(start_paused = true)]
async fn partitioned_recipient_times_out_then_resumes() {
    let sandbox = l1_and_l2();
    let preimage = first_burn(L2_CHAIN_ID);
    fund_and_burn(&sandbox.network, L1_CHAIN_ID, sender(), &preimage)
        .await
        .unwrap();

    sandbox.messenger.partition(L2_CHAIN_ID).await;
    let mut round = RelayRound::new(vec![L1_CHAIN_ID], vec![L1_CHAIN_ID, L2_CHAIN_ID]);
    let err = sandbox.relayer.run_round(&mut round).await.unwrap_err();
    assert!(matches!(err, BridgeError::MessageDeliveryTimeout { destination, .. } if destination == L2_CHAIN_ID));
    assert!(err.is_retryable());
    assert_eq!(round.state, RelayState::GigaRootAggregated);
    assert_eq!(round.distributed_to, vec![L1_CHAIN_ID]);

    sandbox.messenger.heal(L2_CHAIN_ID).await;
    sandbox.relayer.run_round(&mut round).await.unwrap();
    assert!(round.is_complete());

    let payout = sandbox
        .relayer
        .mint(&request(L1_CHAIN_ID, preimage))
        .await
        .unwrap();
    assert_eq!(payout.chain_id, L2_CHAIN_ID);

    // Retried sends arrive late and must not change the accepted root twice.
    let l2 = sandbox.network.ledger(L2_CHAIN_ID).unwrap();
    let l2 = l2.lock().await;
    let received = l2
        .journal()
        .iter()
        .filter(|entry| matches!(entry.event, LedgerEvent::ReceivedGigaRoot { .. }))
        .count();
    assert_eq!(received, 1);
}

#[tokio::test(start_paused = true)]
async fn duplicate_deliveries_are_harmless() {
    let sandbox = l1_and_l2_with(MessengerSettings {
        latency_ms: 20,
        duplicate_deliveries: true,
    });
    let first = first_burn(L1_CHAIN_ID);
    let second = second_burn(L1_CHAIN_ID);

    fund_and_burn(&sandbox.network, L2_CHAIN_ID, sender(), &first)
        .await
        .unwrap();
    sandbox
        .relayer
        .bridge_round(&[L2_CHAIN_ID], &[L1_CHAIN_ID, SECOND_L2_CHAIN_ID])
        .await
        .unwrap();

    fund_and_burn(&sandbox.network, L2_CHAIN_ID, sender(), &second)
        .await
        .unwrap();
    sandbox
        .relayer
        .bridge_round(&[L2_CHAIN_ID], &[L1_CHAIN_ID, SECOND_L2_CHAIN_ID])
        .await
        .unwrap();

    // Let the duplicate of the first round's local root land after the second.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    sandbox
        .relayer
        .bridge_round(&[], &[SECOND_L2_CHAIN_ID])
        .await
        .unwrap();

    {
        let hub = sandbox.network.hub();
        let hub = hub.lock().await;
        assert_eq!(hub.local_root(L2_CHAIN_ID).unwrap().leaf_count, 2);
    }

    for preimage in [first, second] {
        sandbox
            .relayer
            .mint(&request(L2_CHAIN_ID, preimage))
            .await
            .unwrap();
    }
    let (sent, delivered) = sandbox.messenger.stats().await;
    assert!(delivered > sent);
}

#[tokio::test(start_paused = true)]
async fn giga_root_is_independent_of_propagation_order() {
    async fn run(order: [u64; 2], latency_ms: u64) -> warptoad_core::FieldBytes {
        let sandbox = l1_and_l2_with(MessengerSettings {
            latency_ms,
            duplicate_deliveries: false,
        });
        fund_and_burn(&sandbox.network, L2_CHAIN_ID, sender(), &random_burn(1, L1_CHAIN_ID, 10))
            .await
            .unwrap();
        fund_and_burn(
            &sandbox.network,
            SECOND_L2_CHAIN_ID,
            sender(),
            &random_burn(2, L1_CHAIN_ID, 20),
        )
        .await
        .unwrap();
        for source in order {
            sandbox
                .relayer
                .bridge_round(&[source], &[L1_CHAIN_ID])
                .await
                .unwrap();
        }
        let hub = sandbox.network.hub();
        let root = hub.lock().await.latest_snapshot().unwrap().giga_root;
        root
    }

    let forward = run([L2_CHAIN_ID, SECOND_L2_CHAIN_ID], 10).await;
    let backward = run([SECOND_L2_CHAIN_ID, L2_CHAIN_ID], 70).await;
    assert_eq!(forward, backward);
}

#[tokio::test(start_paused = true)]
async fn mint_before_checkpoint_reports_leaf_not_checkpointed() {
    let sandbox = l1_only();
    let preimage = first_burn(L1_CHAIN_ID);
    sandbox
        .relayer
        .bridge_round(&[L1_CHAIN_ID], &[L1_CHAIN_ID])
        .await
        .unwrap();
    fund_and_burn(&sandbox.network, L1_CHAIN_ID, sender(), &preimage)
        .await
        .unwrap();

    let err = sandbox
        .relayer
        .mint(&request(L1_CHAIN_ID, preimage))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BridgeError::Core(WarpToadError::LeafNotCheckpointed { index: 0, .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn mint_for_unknown_burn_reports_leaf_not_found() {
    let sandbox = l1_only();
    sandbox
        .relayer
        .bridge_round(&[L1_CHAIN_ID], &[L1_CHAIN_ID])
        .await
        .unwrap();
    let err = sandbox
        .relayer
        .mint(&request(L1_CHAIN_ID, first_burn(L1_CHAIN_ID)))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::Core(WarpToadError::LeafNotFound(_))));
}

#[tokio::test(start_paused = true)]
async fn mint_to_wrong_destination_is_rejected() {
    let sandbox = l1_and_l2();
    let preimage = first_burn(L2_CHAIN_ID);
    fund_and_burn(&sandbox.network, L1_CHAIN_ID, sender(), &preimage)
        .await
        .unwrap();
    let err = warptoad_bridge::ProofInputAssembler::new(&sandbox.network)
        .assemble(
            L1_CHAIN_ID,
            L1_CHAIN_ID,
            &preimage,
            &canonical_quote(),
            sender(),
            recipient(),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BridgeError::WrongDestination { expected: L2_CHAIN_ID, actual: L1_CHAIN_ID }
    ));
}

#[tokio::test(start_paused = true)]
async fn fee_stays_within_quote() {
    let sandbox: Sandbox = l1_and_l2();
    let preimage = second_burn(L2_CHAIN_ID);
    fund_and_burn(&sandbox.network, L1_CHAIN_ID, sender(), &preimage)
        .await
        .unwrap();
    sandbox
        .relayer
        .bridge_round(&[L1_CHAIN_ID], &[L2_CHAIN_ID])
        .await
        .unwrap();

    let quote = canonical_quote();
    let gas_used = sandbox.network.gas_schedule().mint_gas_for(L2_CHAIN_ID);
    let payout = sandbox
        .relayer
        .mint(&request(L1_CHAIN_ID, preimage.clone()))
        .await
        .unwrap();

    let expected = quote.fee_factor * gas_used;
    assert!(payout.fee <= MAX_FEE);
    assert!(payout.fee.abs_diff(expected) <= expected / 20);
    assert_eq!(
        payout.fee,
        sandbox
            .network
            .gas_schedule()
            .estimate_fee(L2_CHAIN_ID, &quote, preimage.amount)
    );
    assert_eq!(
        preimage.nullifier(&PoseidonHasher).unwrap(),
        payout.nullifier
    );
}

#[tokio::test(start_paused = true)]
async fn concurrent_relayers_confirm_each_others_deliveries() {
    let sandbox = l1_and_l2_with(MessengerSettings {
        latency_ms: 30,
        duplicate_deliveries: false,
    });
    let settings = RelayerSettings {
        max_retries: 0,
        ..fast_relayer_settings()
    };
    let first = Relayer::new(
        Arc::clone(&sandbox.network),
        settings.clone(),
        warptoad_core::Address::derive("first relayer"),
        Arc::new(NativeWitnessBackend::default()),
    );
    let second = Relayer::new(
        Arc::clone(&sandbox.network),
        settings,
        warptoad_core::Address::derive("second relayer"),
        Arc::new(NativeWitnessBackend::default()),
    );

    let from_l2 = random_burn(7, L1_CHAIN_ID, 10);
    let from_second_l2 = random_burn(8, L1_CHAIN_ID, 20);
    fund_and_burn(&sandbox.network, L2_CHAIN_ID, sender(), &from_l2)
        .await
        .unwrap();
    fund_and_burn(&sandbox.network, SECOND_L2_CHAIN_ID, sender(), &from_second_l2)
        .await
        .unwrap();

    let (a, b) = tokio::join!(
        first.bridge_round(&[L2_CHAIN_ID], &[L1_CHAIN_ID]),
        second.bridge_round(&[SECOND_L2_CHAIN_ID], &[L1_CHAIN_ID]),
    );
    assert!(a.unwrap().is_complete());
    assert!(b.unwrap().is_complete());

    {
        let hub = sandbox.network.hub();
        let hub = hub.lock().await;
        assert_eq!(hub.local_root(L2_CHAIN_ID).unwrap().leaf_count, 1);
        assert_eq!(hub.local_root(SECOND_L2_CHAIN_ID).unwrap().leaf_count, 1);
    }

    // Either round may have aggregated first; a closing round covers both.
    sandbox
        .relayer
        .bridge_round(&[], &[L1_CHAIN_ID])
        .await
        .unwrap();
    for (burn_chain, preimage) in [(L2_CHAIN_ID, from_l2), (SECOND_L2_CHAIN_ID, from_second_l2)] {
        sandbox
            .relayer
            .mint(&request(burn_chain, preimage))
            .await
            .unwrap();
    }
}

#[tokio::test(start_paused = true)]
async fn round_aggregates_only_participating_chains() {
    let sandbox = l1_and_l2();
    let preimage = first_burn(L1_CHAIN_ID);
    fund_and_burn(&sandbox.network, L2_CHAIN_ID, sender(), &preimage)
        .await
        .unwrap();

    let round = sandbox
        .relayer
        .bridge_round_over(&[L2_CHAIN_ID], &[L1_CHAIN_ID], &[L1_CHAIN_ID, L2_CHAIN_ID])
        .await
        .unwrap();
    let snapshot = round.snapshot.unwrap();
    assert_eq!(
        snapshot.chain_ids().collect::<Vec<_>>(),
        vec![L1_CHAIN_ID, L2_CHAIN_ID]
    );
    assert!(snapshot.entry(SECOND_L2_CHAIN_ID).is_none());

    let payout = sandbox
        .relayer
        .mint(&request(L2_CHAIN_ID, preimage))
        .await
        .unwrap();
    assert_eq!(payout.chain_id, L1_CHAIN_ID);

    let everyone = sandbox
        .relayer
        .bridge_round(&[], &[L1_CHAIN_ID])
        .await
        .unwrap();
    assert!(everyone.snapshot.unwrap().entry(SECOND_L2_CHAIN_ID).is_some());
}

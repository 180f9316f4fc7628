mod common;

use common::*;
use scheduling::model::PartyId;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_overlapping_bookings_yield_one_winner() -> anyhow::Result<()> {
    let env = setup().await;
    const N: u32 = 8;

    let handles: Vec<_> = (0..N)
        .map(|i| {
            let client = env.client.clone();
            tokio::spawn(async move {
                client
                    .book(new_appointment(i64::from(i) + 1, 7, nov25(15, 30 + i)))
                    .await
            })
        })
        .collect();

    let mut ok = 0;
    let mut conflicts = 0;
    for h in handles {
        match h.await? {
            Ok(_) => ok += 1,
            Err(e) if e.is_conflict() => conflicts += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(ok, 1);
    assert_eq!(conflicts, N - 1);
    assert_eq!(env.client.list_for_provider(PartyId(7)).await?.len(), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_bookings_for_distinct_providers_all_succeed() -> anyhow::Result<()> {
    let env = setup().await;
    const N: i64 = 32;

    for round in 0..3 {
        let handles: Vec<_> = (0..N)
            .map(|i| {
                let client = env.client.clone();
                tokio::spawn(async move {
                    client
                        .book(new_appointment(1, 100 + i, nov25(10 + round, 0)))
                        .await
                })
            })
            .collect();

        for h in handles {
            if let Err(e) = h.await? {
                panic!("round {round}: booking for a free provider failed: {e}");
            }
        }
    }

    for i in 0..N {
        assert_eq!(env.client.list_for_provider(PartyId(100 + i)).await?.len(), 3);
    }
    assert_eq!(env.client.list_for_requester(PartyId(1)).await?.len(), 3 * N as usize);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_reschedules_into_one_slot_yield_one_winner() -> anyhow::Result<()> {
    let env = setup().await;
    let mut ids = Vec::new();
    for h in [9, 11, 13, 15] {
        ids.push(env.client.book(new_appointment(1, 7, nov25(h, 0))).await?);
    }

    let handles: Vec<_> = ids
        .iter()
        .map(|&id| {
            let client = env.client.clone();
            tokio::spawn(async move { client.reschedule(id, nov25(18, 0)).await })
        })
        .collect();

    let mut moved = 0;
    for h in handles {
        match h.await? {
            Ok(true) => moved += 1,
            Ok(false) => panic!("appointment vanished"),
            Err(e) => assert!(e.is_conflict(), "unexpected error: {e}"),
        }
    }
    assert_eq!(moved, 1);

    let at_six = env
        .client
        .list_for_provider(PartyId(7))
        .await?
        .into_iter()
        .filter(|a| a.scheduled_at == nov25(18, 0))
        .count();
    assert_eq!(at_six, 1);
    Ok(())
}

mod common;

use std::sync::Arc;

use common::*;
use scheduling::domain::repo::{AppointmentsRepository, AppointmentsTx, PartiesRepository};
use scheduling::infra::storage::{SqliteAppointmentsRepository, SqlitePartiesRepository};
use scheduling::model::{AppointmentId, AppointmentStatus, PartyId, PartyRole};

async fn store() -> (TestEnv, SqliteAppointmentsRepository) {
    let env = setup().await;
    let repo = SqliteAppointmentsRepository::new(env.db.clone());
    (env, repo)
}

#[tokio::test]
async fn insert_assigns_increasing_ids_and_defaults_to_booked() -> anyhow::Result<()> {
    let (_env, repo) = store().await;

    let mut tx = repo.begin().await?;
    let a = tx.insert(&new_appointment(1, 7, nov25(9, 0))).await?;
    let b = tx.insert(&new_appointment(2, 7, nov25(9, 5))).await?;
    tx.commit().await?;

    assert!(b > a);
    let stored = repo.find_by_id(a).await?.unwrap();
    assert_eq!(stored.status, AppointmentStatus::Booked);
    assert_eq!(stored.requester_id, PartyId(1));
    Ok(())
}

#[tokio::test]
async fn dropped_unit_of_work_rolls_back() -> anyhow::Result<()> {
    let (_env, repo) = store().await;

    {
        let mut tx = repo.begin().await?;
        tx.insert(&new_appointment(1, 7, nov25(9, 0))).await?;
    }
    assert!(repo.list_by_provider(PartyId(7)).await?.is_empty());

    let mut tx = repo.begin().await?;
    tx.insert(&new_appointment(1, 7, nov25(9, 0))).await?;
    tx.rollback().await?;
    assert!(repo.list_by_provider(PartyId(7)).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn status_updates() -> anyhow::Result<()> {
    let (_env, repo) = store().await;

    let mut tx = repo.begin().await?;
    let id = tx.insert(&new_appointment(1, 7, nov25(9, 0))).await?;

    assert!(tx.update_status(id, AppointmentStatus::Completed).await?);
    assert!(!tx.update_status(AppointmentId(999), AppointmentStatus::Completed).await?);

    // conditional write only from the expected status
    assert!(
        !tx.update_status_from(id, AppointmentStatus::Booked, AppointmentStatus::Cancelled)
            .await?
    );
    assert!(
        tx.update_status_from(id, AppointmentStatus::Completed, AppointmentStatus::Cancelled)
            .await?
    );

    assert!(tx.update_schedule(id, nov25(12, 0), AppointmentStatus::Booked).await?);
    let current = tx.find_by_id(id).await?.unwrap();
    assert_eq!(current.scheduled_at, nov25(12, 0));
    assert_eq!(current.status, AppointmentStatus::Booked);
    tx.commit().await?;
    Ok(())
}

#[tokio::test]
async fn window_count_is_inclusive_and_honours_exclusion() -> anyhow::Result<()> {
    let (_env, repo) = store().await;
    let provider = PartyId(7);

    let mut tx = repo.begin().await?;
    let a = tx.insert(&new_appointment(1, 7, nov25(9, 0))).await?;
    let b = tx.insert(&new_appointment(2, 7, nov25(9, 20))).await?;
    tx.insert(&new_appointment(3, 8, nov25(9, 10))).await?;

    assert_eq!(
        tx.count_active_in_window(provider, nov25(9, 0), nov25(9, 20), None)
            .await?,
        2
    );
    assert_eq!(
        tx.count_active_in_window(provider, nov25(9, 0), nov25(9, 20), Some(a))
            .await?,
        1
    );
    assert_eq!(
        tx.count_active_in_window(provider, nov25(9, 1), nov25(9, 19), None)
            .await?,
        0
    );

    tx.update_status(b, AppointmentStatus::Cancelled).await?;
    assert_eq!(
        tx.count_active_in_window(provider, nov25(9, 0), nov25(9, 20), Some(a))
            .await?,
        0
    );
    tx.commit().await?;
    Ok(())
}

#[tokio::test]
async fn party_rows_keep_their_profile() -> anyhow::Result<()> {
    let env = setup().await;
    let repo = SqlitePartiesRepository::new(Arc::clone(&env.db));

    let doctor = repo.insert(&new_provider("house", "Diagnostics")).await?;
    assert!(repo.username_exists("house").await?);
    assert!(!repo.username_exists("wilson").await?);

    let err = repo
        .insert(&new_requester("house"))
        .await
        .unwrap_err();
    assert!(err
        .chain()
        .any(|e| e.is::<scheduling::domain::repo::DuplicateUsername>()));

    assert_eq!(repo.find_by_id(doctor.id).await?, Some(doctor.clone()));
    assert!(repo.list(Some(PartyRole::Requester)).await?.is_empty());
    assert_eq!(repo.list(Some(PartyRole::Provider)).await?, vec![doctor]);
    Ok(())
}

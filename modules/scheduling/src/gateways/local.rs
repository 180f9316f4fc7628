use async_trait::async_trait;
use chrono::NaiveDateTime;
use std::sync::Arc;

use crate::contract::{
    client::SchedulingApi,
    error::SchedulingError,
    model::{Appointment, AppointmentId, NewAppointment, NewParty, Party, PartyId, PartyRole},
};
use crate::domain::service::Service;

/// Local implementation of the SchedulingApi trait that delegates to the domain service
pub struct SchedulingLocalClient {
    service: Arc<Service>,
}

impl SchedulingLocalClient {
    pub fn new(service: Arc<Service>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl SchedulingApi for SchedulingLocalClient {
    async fn book(&self, new: NewAppointment) -> Result<AppointmentId, SchedulingError> {
        self.service.book(new).await.map_err(Into::into)
    }

    async fn cancel(&self, id: AppointmentId) -> Result<bool, SchedulingError> {
        self.service.cancel(id).await.map_err(Into::into)
    }

    async fn complete(&self, id: AppointmentId) -> Result<bool, SchedulingError> {
        self.service.complete(id).await.map_err(Into::into)
    }

    async fn reschedule(
        &self,
        id: AppointmentId,
        new_time: NaiveDateTime,
    ) -> Result<bool, SchedulingError> {
        self.service
            .reschedule(id, new_time)
            .await
            .map_err(Into::into)
    }

    async fn check_availability(
        &self,
        provider_id: PartyId,
        at: NaiveDateTime,
    ) -> Result<bool, SchedulingError> {
        self.service
            .check_availability(provider_id, at)
            .await
            .map_err(Into::into)
    }

    async fn get_appointment(
        &self,
        id: AppointmentId,
    ) -> Result<Option<Appointment>, SchedulingError> {
        self.service.get_appointment(id).await.map_err(Into::into)
    }

    async fn list_for_requester(
        &self,
        requester_id: PartyId,
    ) -> Result<Vec<Appointment>, SchedulingError> {
        self.service
            .list_for_requester(requester_id)
            .await
            .map_err(Into::into)
    }

    async fn list_for_provider(
        &self,
        provider_id: PartyId,
    ) -> Result<Vec<Appointment>, SchedulingError> {
        self.service
            .list_for_provider(provider_id)
            .await
            .map_err(Into::into)
    }

    async fn register_party(&self, new: NewParty) -> Result<Party, SchedulingError> {
        self.service.register_party(new).await.map_err(Into::into)
    }

    async fn get_party(&self, id: PartyId) -> Result<Option<Party>, SchedulingError> {
        self.service.get_party(id).await.map_err(Into::into)
    }

    async fn list_parties(&self, role: Option<PartyRole>) -> Result<Vec<Party>, SchedulingError> {
        self.service.list_parties(role).await.map_err(Into::into)
    }
}

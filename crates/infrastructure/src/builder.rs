use std::sync::Arc;

use application::{
    Calendar, CounsellorRepository, MeetingProvider, Messenger, PaymentGateway,
};
use config::{AppConfig, CounsellorSeed};
use domain::{Counsellor, CounsellorId, CounsellorProfile, DomainError, RepositoryError, Timestamp};
use thiserror::Error;

use crate::{
    collaborators::{InMemoryCalendar, LinkMeetingProvider, ManualPaymentGateway, TracingMessenger},
    memory::MemoryStorage,
};

#[derive(Debug, Error)]
pub enum InfrastructureError {
    #[error("invalid counsellor seed `{id}`: {source}")]
    Seed {
        id: String,
        #[source]
        source: DomainError,
    },
    #[error("storage error: {0}")]
    Storage(#[from] RepositoryError),
}

/// 存储与协作方适配器的集合
#[derive(Clone)]
pub struct Infrastructure {
    pub storage: Arc<MemoryStorage>,
    pub calendar: Arc<InMemoryCalendar>,
    pub payment_gateway: Arc<ManualPaymentGateway>,
    pub meetings: Arc<LinkMeetingProvider>,
    pub messenger: Arc<TracingMessenger>,
}

impl Infrastructure {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            storage: Arc::new(MemoryStorage::new()),
            calendar: Arc::new(InMemoryCalendar::new()),
            payment_gateway: Arc::new(ManualPaymentGateway::new()),
            meetings: Arc::new(LinkMeetingProvider::new(
                config.collaborators.meeting_base_url.as_str(),
            )),
            messenger: Arc::new(TracingMessenger::new()),
        }
    }

    /// 创建适配器并载入配置中的顾问档案
    pub async fn build(config: &AppConfig, now: Timestamp) -> Result<Self, InfrastructureError> {
        let infrastructure = Self::new(config);
        for seed in &config.counsellors {
            let counsellor = seed_counsellor(seed, now)?;
            infrastructure.storage.create(counsellor).await?;
        }
        tracing::info!(counsellors = config.counsellors.len(), "directory seeded");
        Ok(infrastructure)
    }

    pub fn calendar_trait(&self) -> Arc<dyn Calendar> {
        self.calendar.clone()
    }

    pub fn payment_gateway_trait(&self) -> Arc<dyn PaymentGateway> {
        self.payment_gateway.clone()
    }

    pub fn meetings_trait(&self) -> Arc<dyn MeetingProvider> {
        self.meetings.clone()
    }

    pub fn messenger_trait(&self) -> Arc<dyn Messenger> {
        self.messenger.clone()
    }
}

fn seed_counsellor(seed: &CounsellorSeed, now: Timestamp) -> Result<Counsellor, InfrastructureError> {
    let to_error = |source| InfrastructureError::Seed {
        id: seed.id.clone(),
        source,
    };
    let id = CounsellorId::parse(seed.id.as_str()).map_err(to_error)?;
    let profile = CounsellorProfile {
        display_name: seed.display_name.clone(),
        institution: seed.institution.clone(),
        program: seed.program.clone(),
        specialty_tags: seed.specialty_tags.clone(),
        external_scheduling_ref: seed.external_scheduling_ref.clone(),
        graduation_year: seed.graduation_year,
        bio: seed.bio.clone(),
        photo_url: seed.photo_url.clone(),
    };
    Counsellor::onboard(id, profile, now).map_err(to_error)
}

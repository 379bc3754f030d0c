use std::sync::Arc;

use domain::{
    Counsellor, CounsellorFilter, CounsellorId, CounsellorProfile, DomainError, ProfileChanges,
    RepositoryError,
};

use crate::{
    clock::Clock,
    error::{ApplicationError, ApplicationResult},
    repository::CounsellorRepository,
};

pub struct DirectoryServiceDependencies {
    pub counsellor_repository: Arc<dyn CounsellorRepository>,
    pub clock: Arc<dyn Clock>,
}

/// 顾问目录，读多写少
pub struct DirectoryService {
    deps: DirectoryServiceDependencies,
}

impl DirectoryService {
    pub fn new(deps: DirectoryServiceDependencies) -> Self {
        Self { deps }
    }

    pub async fn register_counsellor(
        &self,
        id: &str,
        profile: CounsellorProfile,
    ) -> ApplicationResult<Counsellor> {
        let id = CounsellorId::parse(id)?;
        let counsellor = Counsellor::onboard(id, profile, self.deps.clock.now())?;
        let stored = self
            .deps
            .counsellor_repository
            .create(counsellor)
            .await
            .map_err(|err| match err {
                RepositoryError::Conflict => ApplicationError::Domain(
                    DomainError::invalid_argument("id", "already registered"),
                ),
                other => other.into(),
            })?;
        tracing::info!(counsellor_id = %stored.id, "counsellor registered");
        Ok(stored)
    }

    pub async fn update_profile(
        &self,
        id: &CounsellorId,
        changes: ProfileChanges,
    ) -> ApplicationResult<Counsellor> {
        let mut counsellor = self.get_counsellor(id).await?;
        counsellor.apply(changes, self.deps.clock.now())?;
        Ok(self.deps.counsellor_repository.update(counsellor).await?)
    }

    /// 停用后不再出现在默认列表中，也不能接受新预约；已有记录保持不变。
    pub async fn deactivate(&self, id: &CounsellorId) -> ApplicationResult<Counsellor> {
        let mut counsellor = self.get_counsellor(id).await?;
        if !counsellor.active {
            return Ok(counsellor);
        }
        counsellor.deactivate(self.deps.clock.now());
        let stored = self.deps.counsellor_repository.update(counsellor).await?;
        tracing::info!(counsellor_id = %stored.id, "counsellor deactivated");
        Ok(stored)
    }

    /// 按显示名称排序
    pub async fn list_counsellors(
        &self,
        filter: &CounsellorFilter,
    ) -> ApplicationResult<Vec<Counsellor>> {
        let mut counsellors: Vec<Counsellor> = self
            .deps
            .counsellor_repository
            .list()
            .await?
            .into_iter()
            .filter(|c| filter.matches(c))
            .collect();
        counsellors.sort_by(|a, b| {
            a.display_name
                .to_lowercase()
                .cmp(&b.display_name.to_lowercase())
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(counsellors)
    }

    pub async fn get_counsellor(&self, id: &CounsellorId) -> ApplicationResult<Counsellor> {
        self.deps
            .counsellor_repository
            .find_by_id(id)
            .await?
            .ok_or(ApplicationError::Domain(DomainError::CounsellorNotFound))
    }

    /// 可以接受新预约的顾问
    pub async fn require_active(&self, id: &CounsellorId) -> ApplicationResult<Counsellor> {
        let counsellor = self.get_counsellor(id).await?;
        if !counsellor.active {
            return Err(DomainError::CounsellorInactive.into());
        }
        Ok(counsellor)
    }
}

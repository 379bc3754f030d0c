use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::value_objects::{CounsellorId, Timestamp};

/// 朋辈顾问档案。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counsellor {
    pub id: CounsellorId,
    pub display_name: String,
    pub institution: String,
    pub program: String,
    pub specialty_tags: BTreeSet<String>,
    /// 外部日历服务的句柄，对核心不透明
    pub external_scheduling_ref: String,
    pub graduation_year: Option<u16>,
    pub bio: Option<String>,
    pub photo_url: Option<String>,
    /// 停用而非删除，保证历史预约完整
    pub active: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// 入驻时提交的档案。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounsellorProfile {
    pub display_name: String,
    pub institution: String,
    pub program: String,
    #[serde(default)]
    pub specialty_tags: Vec<String>,
    pub external_scheduling_ref: String,
    #[serde(default)]
    pub graduation_year: Option<u16>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
}

/// 档案编辑，只修改给出的字段。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileChanges {
    pub display_name: Option<String>,
    pub institution: Option<String>,
    pub program: Option<String>,
    pub specialty_tags: Option<Vec<String>>,
    pub external_scheduling_ref: Option<String>,
    pub graduation_year: Option<u16>,
    pub bio: Option<String>,
    pub photo_url: Option<String>,
}

impl Counsellor {
    pub fn onboard(
        id: CounsellorId,
        profile: CounsellorProfile,
        now: Timestamp,
    ) -> Result<Self, DomainError> {
        Ok(Self {
            id,
            display_name: required("display_name", profile.display_name, 80)?,
            institution: required("institution", profile.institution, 120)?,
            program: required("program", profile.program, 120)?,
            specialty_tags: normalize_tags(profile.specialty_tags),
            external_scheduling_ref: required(
                "external_scheduling_ref",
                profile.external_scheduling_ref,
                512,
            )?,
            graduation_year: profile.graduation_year,
            bio: profile.bio,
            photo_url: profile.photo_url,
            active: true,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn apply(&mut self, changes: ProfileChanges, now: Timestamp) -> Result<(), DomainError> {
        if let Some(name) = changes.display_name {
            self.display_name = required("display_name", name, 80)?;
        }
        if let Some(institution) = changes.institution {
            self.institution = required("institution", institution, 120)?;
        }
        if let Some(program) = changes.program {
            self.program = required("program", program, 120)?;
        }
        if let Some(tags) = changes.specialty_tags {
            self.specialty_tags = normalize_tags(tags);
        }
        if let Some(reference) = changes.external_scheduling_ref {
            self.external_scheduling_ref = required("external_scheduling_ref", reference, 512)?;
        }
        if changes.graduation_year.is_some() {
            self.graduation_year = changes.graduation_year;
        }
        if changes.bio.is_some() {
            self.bio = changes.bio;
        }
        if changes.photo_url.is_some() {
            self.photo_url = changes.photo_url;
        }
        self.updated_at = now;
        Ok(())
    }

    pub fn deactivate(&mut self, now: Timestamp) {
        self.active = false;
        self.updated_at = now;
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.specialty_tags
            .iter()
            .any(|own| own.eq_ignore_ascii_case(tag.trim()))
    }
}

fn required(field: &str, value: String, max_len: usize) -> Result<String, DomainError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::invalid_argument(field, "cannot be empty"));
    }
    if trimmed.len() > max_len {
        return Err(DomainError::invalid_argument(field, "too long"));
    }
    Ok(trimmed.to_owned())
}

fn normalize_tags(tags: Vec<String>) -> BTreeSet<String> {
    tags.into_iter()
        .map(|tag| tag.trim().to_owned())
        .filter(|tag| !tag.is_empty())
        .collect()
}

/// 目录查询条件
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounsellorFilter {
    pub specialty_tag: Option<String>,
    pub institution: Option<String>,
    #[serde(default)]
    pub include_inactive: bool,
}

impl CounsellorFilter {
    pub fn matches(&self, counsellor: &Counsellor) -> bool {
        if !self.include_inactive && !counsellor.active {
            return false;
        }
        if let Some(tag) = &self.specialty_tag {
            if !counsellor.has_tag(tag) {
                return false;
            }
        }
        if let Some(institution) = &self.institution {
            if !counsellor
                .institution
                .eq_ignore_ascii_case(institution.trim())
            {
                return false;
            }
        }
        true
    }
}

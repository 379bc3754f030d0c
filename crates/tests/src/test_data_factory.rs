use chrono::{TimeZone, Utc};
use config::{AppConfig, CounsellorSeed};
use domain::{CounsellorId, Timestamp};

/// 2025 年 9 月某天的 UTC 时间
pub fn at(day: u32, hour: u32, minute: u32) -> Timestamp {
    Utc.with_ymd_and_hms(2025, 9, day, hour, minute, 0).unwrap()
}

/// 测试环境的起始时间：会话前一天
pub fn test_start() -> Timestamp {
    Utc.with_ymd_and_hms(2025, 8, 31, 9, 0, 0).unwrap()
}

pub fn counsellor_seed(id: &str, name: &str, institution: &str) -> CounsellorSeed {
    CounsellorSeed {
        id: id.into(),
        display_name: name.into(),
        institution: institution.into(),
        program: "MSc".into(),
        specialty_tags: vec!["visa".into()],
        external_scheduling_ref: format!("calendly/{id}"),
        graduation_year: None,
        bio: None,
        photo_url: None,
    }
}

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.counsellors = vec![
        counsellor_seed("mira", "Mira", "TU Munich"),
        counsellor_seed("liam", "Liam", "University of Toronto"),
    ];
    config.notifications.backoff_base_ms = 1;
    config.collaborators.timeout_ms = 500;
    config
}

pub fn counsellor(id: &str) -> CounsellorId {
    CounsellorId::parse(id).unwrap()
}

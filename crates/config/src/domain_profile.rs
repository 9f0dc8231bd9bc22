//! Per-domain keyword and compound-rule tables for the classifier
//!
//! Generalizes the teacher's term-dictionary-with-category-boosts pattern
//! into a config-driven table keyed by the four consulting domains, loaded
//! with serde defaults so an operator can override individual terms via
//! YAML without restating the whole table.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sme_rag_core::Domain;

/// A compound rule: co-occurrence of all `tokens` within a query boosts
/// `domain` (e.g. "지원"+"기업" -> startup_funding).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompoundRule {
    pub tokens: Vec<String>,
    pub domain: Domain,
}

/// Keyword set and representative queries for one domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainProfile {
    pub domain: Domain,
    /// Single-token keywords that are a hint (not a guarantee) for this domain.
    pub keywords: Vec<String>,
    /// Multi-token compound rules, checked independently of `keywords`.
    pub compound_rules: Vec<CompoundRule>,
    /// Representative queries whose embeddings form this domain's
    /// vector-centroid (cached with double-checked locking by the classifier).
    pub representative_queries: Vec<String>,
}

fn startup_funding_profile() -> DomainProfile {
    DomainProfile {
        domain: Domain::StartupFunding,
        keywords: vec![
            "창업".into(), "지원사업".into(), "정부지원".into(), "투자".into(),
            "벤처".into(), "예비창업자".into(), "사업계획서".into(), "크라우드펀딩".into(),
        ],
        compound_rules: vec![
            CompoundRule { tokens: vec!["지원".into(), "기업".into()], domain: Domain::StartupFunding },
            CompoundRule { tokens: vec!["창업".into(), "자금".into()], domain: Domain::StartupFunding },
        ],
        representative_queries: vec![
            "예비창업패키지 지원 자격이 어떻게 되나요?".into(),
            "초기 창업 자금을 어디서 지원받을 수 있나요?".into(),
            "사업계획서는 어떻게 작성해야 하나요?".into(),
        ],
    }
}

fn finance_tax_profile() -> DomainProfile {
    DomainProfile {
        domain: Domain::FinanceTax,
        keywords: vec![
            "부가세".into(), "부가가치세".into(), "세무".into(), "종합소득세".into(),
            "세금계산서".into(), "홈택스".into(), "원천징수".into(), "연말정산".into(),
        ],
        compound_rules: vec![
            CompoundRule { tokens: vec!["세금".into(), "신고".into()], domain: Domain::FinanceTax },
        ],
        representative_queries: vec![
            "부가세 신고 기한이 언제인가요?".into(),
            "종합소득세 신고는 어떻게 하나요?".into(),
            "세금계산서 발행 방법이 궁금합니다.".into(),
        ],
    }
}

fn hr_labor_profile() -> DomainProfile {
    DomainProfile {
        domain: Domain::HrLabor,
        keywords: vec![
            "근로계약서".into(), "퇴직금".into(), "최저임금".into(), "4대보험".into(),
            "연차".into(), "해고".into(), "근로기준법".into(), "주휴수당".into(),
        ],
        compound_rules: vec![
            CompoundRule { tokens: vec!["근로".into(), "계약".into()], domain: Domain::HrLabor },
        ],
        representative_queries: vec![
            "근로계약서 작성 시 필수 기재 사항이 뭔가요?".into(),
            "퇴직금 계산은 어떻게 하나요?".into(),
            "4대보험 가입 의무가 있는 직원 기준이 궁금합니다.".into(),
        ],
    }
}

fn law_common_profile() -> DomainProfile {
    DomainProfile {
        domain: Domain::LawCommon,
        keywords: vec![
            "계약서".into(), "분쟁".into(), "소송".into(), "법률".into(),
            "특허".into(), "상표".into(), "판례".into(), "내용증명".into(),
        ],
        compound_rules: vec![
            CompoundRule { tokens: vec!["계약".into(), "해지".into()], domain: Domain::LawCommon },
        ],
        representative_queries: vec![
            "거래처와 계약 분쟁이 생기면 어떻게 해야 하나요?".into(),
            "상표 등록 절차가 궁금합니다.".into(),
            "내용증명은 어떻게 작성하나요?".into(),
        ],
    }
}

/// Tokens that trigger the legal-supplement fetch from `law_common` when the
/// classified domain is not already `law_common` (§4.8).
pub const LEGAL_TRIGGER_TOKENS: &[&str] = &["법", "조", "항", "판례", "특허"];

fn default_profiles() -> HashMap<Domain, DomainProfile> {
    let mut map = HashMap::new();
    map.insert(Domain::StartupFunding, startup_funding_profile());
    map.insert(Domain::FinanceTax, finance_tax_profile());
    map.insert(Domain::HrLabor, hr_labor_profile());
    map.insert(Domain::LawCommon, law_common_profile());
    map
}

/// Hot-swappable table of all four domain profiles, guarded the way the
/// teacher guards its domain term dictionary (`parking_lot::RwLock`).
pub struct DomainProfileTable {
    profiles: Arc<RwLock<HashMap<Domain, DomainProfile>>>,
}

impl Default for DomainProfileTable {
    fn default() -> Self {
        Self { profiles: Arc::new(RwLock::new(default_profiles())) }
    }
}

impl DomainProfileTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, domain: Domain) -> Option<DomainProfile> {
        self.profiles.read().get(&domain).cloned()
    }

    pub fn set(&self, profile: DomainProfile) {
        self.profiles.write().insert(profile.domain, profile);
    }

    pub fn all(&self) -> Vec<DomainProfile> {
        self.profiles.read().values().cloned().collect()
    }
}

/// Global domain profile table, analogous to the teacher's `domain_config()`
/// static accessor.
static DOMAIN_PROFILES: once_cell::sync::Lazy<DomainProfileTable> =
    once_cell::sync::Lazy::new(DomainProfileTable::new);

pub fn domain_profiles() -> &'static DomainProfileTable {
    &DOMAIN_PROFILES
}

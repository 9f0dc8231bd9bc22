//! Per-domain action suggestions (§4.9, action-aware generation)
//!
//! Surfaced alongside a generated answer when `action_aware_generation`
//! is enabled: a small, rule-based set of document-generation and
//! next-step hints keyed off the query's surface form, grounded in the
//! same keyword-trigger idiom as `sme-rag-config::domain_profile`'s
//! classifier keyword tables. This is deliberately not LLM-driven — the
//! action set is small and fixed, so a keyword match is cheaper and more
//! predictable than a model call on every generation.

use sme_rag_core::{ActionSuggestion, Domain};

/// Rule-based action suggestions for one domain's query.
pub fn suggest_actions(domain: Domain, query: &str) -> Vec<ActionSuggestion> {
    match domain {
        Domain::StartupFunding => startup_funding_actions(query),
        Domain::HrLabor => hr_labor_actions(query),
        Domain::LawCommon => law_common_actions(query),
        Domain::FinanceTax => finance_tax_actions(query),
        _ => Vec::new(),
    }
}

fn startup_funding_actions(query: &str) -> Vec<ActionSuggestion> {
    let mut actions = Vec::new();
    if contains_any(query, &["사업계획서"]) {
        actions.push(
            ActionSuggestion::new("generate_business_plan", "사업계획서 초안 생성")
                .with_description("입력하신 사업 내용을 바탕으로 사업계획서 초안을 자동으로 생성합니다")
                .with_param("template", "lean_canvas"),
        );
    }
    if contains_any(query, &["지원사업", "지원금", "정부지원"]) {
        actions.push(
            ActionSuggestion::new("check_funding_eligibility", "지원사업 자격 확인")
                .with_description("기업 정보를 입력하면 해당 지원사업의 신청 자격을 확인합니다"),
        );
    }
    actions
}

fn hr_labor_actions(query: &str) -> Vec<ActionSuggestion> {
    let mut actions = Vec::new();
    if contains_any(query, &["근로계약서", "근로계약"]) {
        actions.push(
            ActionSuggestion::new("generate_contract", "근로계약서 자동 생성")
                .with_description("근로기준법 필수 기재 사항을 반영한 근로계약서 초안을 생성합니다")
                .with_param("template", "employment"),
        );
    }
    if contains_any(query, &["퇴직금"]) {
        actions.push(ActionSuggestion::new("calculate_severance_pay", "퇴직금 계산기").with_description("근속기간과 평균임금을 입력해 퇴직금을 계산합니다"));
    }
    actions
}

fn law_common_actions(query: &str) -> Vec<ActionSuggestion> {
    let mut actions = Vec::new();
    if contains_any(query, &["계약서", "계약"]) {
        actions.push(
            ActionSuggestion::new("generate_contract", "계약서 자동 생성")
                .with_description("거래 조건을 입력하면 표준 계약서 초안을 생성합니다")
                .with_param("template", "general"),
        );
    }
    if contains_any(query, &["내용증명"]) {
        actions.push(ActionSuggestion::new("draft_certified_letter", "내용증명 초안 작성").with_description("분쟁 내용을 입력하면 내용증명 초안을 작성합니다"));
    }
    actions
}

fn finance_tax_actions(query: &str) -> Vec<ActionSuggestion> {
    let mut actions = Vec::new();
    if contains_any(query, &["세금계산서"]) {
        actions.push(ActionSuggestion::new("generate_invoice", "세금계산서 발행 안내").with_description("홈택스 세금계산서 발행 절차를 단계별로 안내합니다"));
    }
    actions
}

fn contains_any(query: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|kw| query.contains(kw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_business_plan_trigger() {
        let actions = suggest_actions(Domain::StartupFunding, "사업계획서 작성 도와주세요");
        assert!(actions.iter().any(|a| a.action_type == "generate_business_plan"));
    }

    #[test]
    fn test_employment_contract_trigger() {
        let actions = suggest_actions(Domain::HrLabor, "근로계약서 필수 기재 사항이 뭔가요");
        assert!(actions.iter().any(|a| a.action_type == "generate_contract"));
    }

    #[test]
    fn test_no_trigger_returns_empty() {
        let actions = suggest_actions(Domain::FinanceTax, "부가세 신고 기한이 언제인가요");
        assert!(actions.is_empty());
    }

    #[test]
    fn test_general_domain_has_no_rules() {
        assert!(suggest_actions(Domain::General, "근로계약서").is_empty());
    }
}

use crate::coercion::{
    coerce_integer, coerce_number, coerce_string_list, first_match, first_number, first_string,
    normalize_confidence, RawFields,
};
use crate::schema::{AnalyticsConfig, DealSource, NormalizedDeal};
use crate::utils::resolve_quarter_label;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_NAME: &str = "N/A";
pub const DEFAULT_ACCOUNT: &str = "Conta não informada";
pub const DEFAULT_OWNER: &str = "N/A";
pub const DEFAULT_STAGE: &str = "N/A";
pub const DEFAULT_RESULT_TYPE: &str = "N/A";

/// A raw record as delivered by the analytics API. Never mutated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawDeal(pub RawFields);

impl RawDeal {
    pub fn fields(&self) -> &RawFields {
        &self.0
    }
}

impl From<RawFields> for RawDeal {
    fn from(fields: RawFields) -> Self {
        Self(fields)
    }
}

/// Ordered synonym keys for each canonical field of one source.
/// Earlier keys take precedence.
#[derive(Debug, Clone, Copy)]
pub struct SourceFieldMap {
    pub name: &'static [&'static str],
    pub account: &'static [&'static str],
    pub owner: &'static [&'static str],
    pub gross: &'static [&'static str],
    pub net: &'static [&'static str],
    pub stage: &'static [&'static str],
    pub result_type: &'static [&'static str],
    pub reason: &'static [&'static str],
    pub confidence: &'static [&'static str],
    pub meddic_score: &'static [&'static str],
    pub bant_score: &'static [&'static str],
    pub close_date: &'static [&'static str],
    pub quarter: &'static [&'static str],
    pub cycle_days: &'static [&'static str],
    pub idle_days: &'static [&'static str],
    pub activities: &'static [&'static str],
    pub forecast_label: &'static [&'static str],
    pub risk_flags: &'static [&'static str],
    pub next_action: &'static [&'static str],
}

const NAME_KEYS: &[&str] = &["Oportunidade", "oportunidade", "Nome_Oportunidade", "name"];
const ACCOUNT_KEYS: &[&str] = &["Conta", "conta", "Cliente", "cliente", "account"];
const OWNER_KEYS: &[&str] = &["Vendedor", "vendedor", "Owner", "owner"];
const GROSS_KEYS: &[&str] = &["Gross", "gross", "val"];
const NET_KEYS: &[&str] = &["Net", "net"];
const CONFIDENCE_KEYS: &[&str] = &["Confianca", "Confiança", "confianca", "confidence"];
const MEDDIC_KEYS: &[&str] = &["MEDDIC_Score", "Meddic_Score", "meddic_score"];
const BANT_KEYS: &[&str] = &["BANT_Score", "Bant_Score", "bant_score"];
const CYCLE_KEYS: &[&str] = &["Ciclo_dias", "Ciclo_Dias", "ciclo_dias", "cycle_days"];
const ACTIVITIES_KEYS: &[&str] = &["Atividades", "atividades", "activities"];

pub const OPEN_FIELDS: SourceFieldMap = SourceFieldMap {
    name: NAME_KEYS,
    account: ACCOUNT_KEYS,
    owner: OWNER_KEYS,
    gross: GROSS_KEYS,
    net: NET_KEYS,
    stage: &["Fase_Atual", "fase_atual", "Fase", "stage"],
    result_type: &["Forecast_IA", "forecast_ia"],
    reason: &["Justificativa_IA", "Risco_Principal", "justificativa_ia"],
    confidence: CONFIDENCE_KEYS,
    meddic_score: MEDDIC_KEYS,
    bant_score: BANT_KEYS,
    close_date: &["Data_Prevista", "data_prevista", "Data_Criacao", "close_date"],
    quarter: &["Fiscal_Q", "fiscal_q", "Trimestre"],
    cycle_days: CYCLE_KEYS,
    idle_days: &["Idle_Dias", "Dias_Sem_Atividade", "idle_days"],
    activities: ACTIVITIES_KEYS,
    forecast_label: &["Forecast_IA", "forecast_ia", "Categoria_Forecast"],
    risk_flags: &["Flags_Risco", "flags_risco", "Risk_Flags"],
    next_action: &["Acao_Sugerida", "acao_sugerida", "Proxima_Acao"],
};

pub const WON_FIELDS: SourceFieldMap = SourceFieldMap {
    name: NAME_KEYS,
    account: ACCOUNT_KEYS,
    owner: OWNER_KEYS,
    gross: GROSS_KEYS,
    net: NET_KEYS,
    stage: &["Status", "status", "Fase_Atual"],
    result_type: &["Tipo_Resultado", "tipo_resultado", "Resultado"],
    reason: &["Fatores_Sucesso", "Causa_Raiz", "fatores_sucesso"],
    confidence: CONFIDENCE_KEYS,
    meddic_score: MEDDIC_KEYS,
    bant_score: BANT_KEYS,
    close_date: &["Data_Fechamento", "data_fechamento", "close_date"],
    quarter: &["Fiscal_Q", "fiscal_q", "Trimestre"],
    cycle_days: CYCLE_KEYS,
    idle_days: &[],
    activities: ACTIVITIES_KEYS,
    forecast_label: &[],
    risk_flags: &[],
    next_action: &[],
};

pub const LOST_FIELDS: SourceFieldMap = SourceFieldMap {
    name: NAME_KEYS,
    account: ACCOUNT_KEYS,
    owner: OWNER_KEYS,
    gross: GROSS_KEYS,
    net: NET_KEYS,
    stage: &["Status", "status", "Fase_Atual"],
    result_type: &["Tipo_Resultado", "tipo_resultado", "Resultado"],
    reason: &["Causa_Raiz", "Fatores_Sucesso", "causa_raiz"],
    confidence: CONFIDENCE_KEYS,
    meddic_score: MEDDIC_KEYS,
    bant_score: BANT_KEYS,
    close_date: &["Data_Fechamento", "data_fechamento", "close_date"],
    quarter: &["Fiscal_Q", "fiscal_q", "Trimestre"],
    cycle_days: CYCLE_KEYS,
    idle_days: &[],
    activities: ACTIVITIES_KEYS,
    forecast_label: &[],
    risk_flags: &["Sinais_Alerta", "sinais_alerta"],
    next_action: &[],
};

pub const SPECIALIST_FIELDS: SourceFieldMap = SourceFieldMap {
    name: &["opportunity_name", "name"],
    account: &["account_name", "account"],
    owner: &["owner", "seller", "specialist"],
    gross: &["booking_total_gross", "gross"],
    net: &["booking_total_net", "net"],
    stage: &["opportunity_status", "stage"],
    result_type: &["opportunity_status", "status"],
    reason: &["notes", "comments"],
    confidence: &["confidence", "probability"],
    meddic_score: &["meddic_score"],
    bant_score: &["bant_score"],
    close_date: &["closed_date", "close_date", "expected_close_date"],
    quarter: &["fiscal_quarter"],
    cycle_days: &["cycle_days"],
    idle_days: &["idle_days"],
    activities: &["activities"],
    forecast_label: &["forecast_category"],
    risk_flags: &["risk_flags"],
    next_action: &["next_action"],
};

impl DealSource {
    pub fn field_map(&self) -> &'static SourceFieldMap {
        match self {
            DealSource::Open => &OPEN_FIELDS,
            DealSource::Won => &WON_FIELDS,
            DealSource::Lost => &LOST_FIELDS,
            DealSource::Specialist => &SPECIALIST_FIELDS,
        }
    }
}

/// Maps one raw record of a known source into the canonical shape.
pub fn normalize_deal(raw: &RawDeal, source: DealSource, config: &AnalyticsConfig) -> NormalizedDeal {
    normalize_with_map(raw, source, source.field_map(), config.fiscal_year_end_month)
}

/// Table-driven core of [`normalize_deal`]. A new source only needs a new
/// [`SourceFieldMap`].
pub fn normalize_with_map(
    raw: &RawDeal,
    source: DealSource,
    fields: &SourceFieldMap,
    fiscal_year_end_month: u32,
) -> NormalizedDeal {
    let raw = raw.fields();
    let text_or = |keys: &[&str], default: &str| {
        first_string(raw, keys).unwrap_or_else(|| default.to_string())
    };

    let close_date = first_string(raw, fields.close_date).unwrap_or_default();
    let explicit_quarter = first_string(raw, fields.quarter);
    let fiscal_quarter =
        resolve_quarter_label(&close_date, explicit_quarter.as_deref(), fiscal_year_end_month);

    let confidence_raw: Option<&Value> = fields
        .confidence
        .iter()
        .filter_map(|key| raw.get(*key))
        .find(|value| coerce_number(value).is_some());

    NormalizedDeal {
        name: text_or(fields.name, DEFAULT_NAME),
        account: text_or(fields.account, DEFAULT_ACCOUNT),
        owner: text_or(fields.owner, DEFAULT_OWNER),
        gross_value: first_number(raw, fields.gross).unwrap_or(0.0),
        net_value: first_number(raw, fields.net).unwrap_or(0.0),
        source,
        stage: text_or(fields.stage, DEFAULT_STAGE),
        result_type: text_or(fields.result_type, DEFAULT_RESULT_TYPE),
        reason: first_string(raw, fields.reason).unwrap_or_default(),
        confidence: normalize_confidence(confidence_raw),
        meddic_score: first_number(raw, fields.meddic_score),
        bant_score: first_number(raw, fields.bant_score),
        close_date,
        cycle_days: first_number(raw, fields.cycle_days).filter(|d| *d >= 0.0),
        idle_days: first_number(raw, fields.idle_days),
        fiscal_quarter,
        activities: first_match(raw, fields.activities, coerce_integer),
        forecast_label: first_string(raw, fields.forecast_label),
        risk_flags: first_match(raw, fields.risk_flags, coerce_string_list).unwrap_or_default(),
        next_action: first_string(raw, fields.next_action),
        row_key: None,
    }
}

pub fn normalize_all(raws: &[RawDeal], source: DealSource, config: &AnalyticsConfig) -> Vec<NormalizedDeal> {
    raws.iter()
        .map(|raw| normalize_deal(raw, source, config))
        .collect()
}

/// Raw arrays for the four sources. Any of them may be missing when an
/// upstream fetch failed or was skipped.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardInput {
    #[serde(default, alias = "openDeals")]
    pub open: Vec<RawDeal>,
    #[serde(default, alias = "wonDeals")]
    pub won: Vec<RawDeal>,
    #[serde(default, alias = "lostDeals")]
    pub lost: Vec<RawDeal>,
    #[serde(default, alias = "specialistDeals")]
    pub specialist: Vec<RawDeal>,
}

impl DashboardInput {
    pub fn from_json(json: &str) -> crate::error::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn raws_for(&self, source: DealSource) -> &[RawDeal] {
        match source {
            DealSource::Open => &self.open,
            DealSource::Won => &self.won,
            DealSource::Lost => &self.lost,
            DealSource::Specialist => &self.specialist,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::QUARTER_NOT_AVAILABLE;
    use serde_json::json;

    fn raw(value: Value) -> RawDeal {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_open_deal_normalization() {
        let deal = normalize_deal(
            &raw(json!({
                "Oportunidade": "Migração ERP",
                "Conta": "Acme",
                "Vendedor": "Ana",
                "Gross": "1200,50",
                "Net": -300,
                "Fase_Atual": "Negociação",
                "Confianca": 0.75,
                "Data_Prevista": "2024-08-20",
                "Idle_Dias": 12,
                "Atividades": "7",
                "MEDDIC_Score": 62,
                "Flags_Risco": "Sem champion; Preço",
                "Acao_Sugerida": "Agendar reunião com decisor"
            })),
            DealSource::Open,
            &AnalyticsConfig::default(),
        );

        assert_eq!(deal.name, "Migração ERP");
        assert_eq!(deal.account, "Acme");
        assert_eq!(deal.owner, "Ana");
        assert_eq!(deal.gross_value, 1200.5);
        assert_eq!(deal.net_value, -300.0);
        assert_eq!(deal.confidence, 75.0);
        assert_eq!(deal.fiscal_quarter, "FY24-Q3");
        assert_eq!(deal.idle_days, Some(12.0));
        assert_eq!(deal.activities, Some(7));
        assert_eq!(deal.meddic_score, Some(62.0));
        assert_eq!(deal.bant_score, None);
        assert_eq!(deal.risk_flags, vec!["Sem champion", "Preço"]);
        assert_eq!(deal.next_action.as_deref(), Some("Agendar reunião com decisor"));
        assert_eq!(deal.source, DealSource::Open);
        assert!(deal.row_key.is_none());
    }

    #[test]
    fn test_empty_record_gets_defaults() {
        let deal = normalize_deal(&RawDeal::default(), DealSource::Lost, &AnalyticsConfig::default());

        assert_eq!(deal.name, DEFAULT_NAME);
        assert_eq!(deal.account, DEFAULT_ACCOUNT);
        assert_eq!(deal.owner, DEFAULT_OWNER);
        assert_eq!(deal.gross_value, 0.0);
        assert_eq!(deal.net_value, 0.0);
        assert_eq!(deal.confidence, 0.0);
        assert_eq!(deal.reason, "");
        assert_eq!(deal.fiscal_quarter, QUARTER_NOT_AVAILABLE);
        assert!(deal.cycle_days.is_none());
        assert!(deal.risk_flags.is_empty());
    }

    #[test]
    fn test_gross_synonyms_and_malformed_values() {
        let config = AnalyticsConfig::default();
        let deal = normalize_deal(&raw(json!({ "val": 42 })), DealSource::Open, &config);
        assert_eq!(deal.gross_value, 42.0);

        let deal = normalize_deal(&raw(json!({ "Gross": "lots" })), DealSource::Open, &config);
        assert_eq!(deal.gross_value, 0.0);
        assert!(!deal.gross_value.is_nan());
    }

    #[test]
    fn test_won_and_lost_reason_priority() {
        let config = AnalyticsConfig::default();
        let record = json!({
            "Fatores_Sucesso": "Relacionamento forte",
            "Causa_Raiz": "Preço acima",
            "Data_Fechamento": "10-02-2024",
            "Tipo_Resultado": "Renovação",
            "Ciclo_dias": -4
        });

        let won = normalize_deal(&raw(record.clone()), DealSource::Won, &config);
        assert_eq!(won.reason, "Relacionamento forte");
        assert_eq!(won.result_type, "Renovação");
        assert_eq!(won.fiscal_quarter, "FY24-Q1");
        assert!(won.cycle_days.is_none());

        let lost = normalize_deal(&raw(record), DealSource::Lost, &config);
        assert_eq!(lost.reason, "Preço acima");
    }

    #[test]
    fn test_specialist_snake_case_fields() {
        let deal = normalize_deal(
            &raw(json!({
                "opportunity_name": "Cloud Landing Zone",
                "account_name": "Globex",
                "booking_total_gross": {"value": "5000"},
                "booking_total_net": 4200,
                "opportunity_status": "Committed",
                "fiscal_quarter": "FY25-Q2",
                "forecast_category": "Commit"
            })),
            DealSource::Specialist,
            &AnalyticsConfig::default(),
        );

        assert_eq!(deal.name, "Cloud Landing Zone");
        assert_eq!(deal.account, "Globex");
        assert_eq!(deal.gross_value, 5000.0);
        assert_eq!(deal.net_value, 4200.0);
        assert_eq!(deal.stage, "Committed");
        assert_eq!(deal.fiscal_quarter, "FY25-Q2");
        assert_eq!(deal.forecast_label.as_deref(), Some("Commit"));
    }

    #[test]
    fn test_partial_dashboard_input() {
        let input = DashboardInput::from_json(r#"{ "wonDeals": [ { "Gross": 10 } ] }"#).unwrap();
        assert!(input.open.is_empty());
        assert_eq!(input.won.len(), 1);
        assert!(input.raws_for(DealSource::Specialist).is_empty());
    }
}

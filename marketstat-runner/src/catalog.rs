//! The source catalog: every collected source, in output-column order.

use crate::config::CollectorConfig;
use crate::source::{ColumnSpec, Coverage, NumberFormat, RequestKind, SourceSpec};
use marketstat_core::domain::Exchange;
use marketstat_core::parse::{
    ArchiveCsvParser, FilteredCsvParser, JsonRecordsParser, JsonScalarParser, LabelledRowParser,
    MemberPattern, MetricField, NamedColumn, RetailSheetParser, SegmentOrdersParser,
    SerialRowsParser, SourceParser,
};

const ZIP_MAGIC: &[u8] = b"PK";
const OLE2_MAGIC: &[u8] = b"\xd0\xcf";

use NumberFormat::{Currency, Integer, Ratio};

/// All sources, in the order their columns appear in the consolidated CSV.
pub fn build_catalog(config: &CollectorConfig) -> Vec<SourceSpec> {
    let e = &config.endpoints;
    vec![
        nse_fo(&e.nse_fo),
        bse_fo(&e.bse_fo),
        category_turnover("nse_cat", &e.nse_cat, "", "NSE_CAT_"),
        category_turnover("nse_eq_cat", &e.nse_eq_cat, "EQ_", "NSE_EQ_"),
        margin_trading(&e.nse_mrg),
        participant_volumes(&e.nse_part),
        registered_investors(
            "nse_reg_investors",
            Exchange::Nse,
            &e.nse_reg_investors,
            "NSE_REG_INVESTORS",
            &["data.regInvestors", "regInvestors"],
        ),
        registered_investors(
            "bse_reg_investors",
            Exchange::Bse,
            &e.bse_reg_investors,
            "BSE_REG_INVESTORS",
            &["Table.0.Inv_count"],
        ),
        mfss(&e.nse_mfss),
        market_turnover(&e.nse_market_turnover),
        tbg_cm(&e.nse_tbg_cm),
        tbg_fo(&e.nse_tbg_fo),
        tbg_commodity(&e.nse_tbg_commodity),
    ]
}

/// Catalog filtered by the config's `sources` allow-list.
pub fn selected_sources(config: &CollectorConfig) -> Vec<SourceSpec> {
    build_catalog(config)
        .into_iter()
        .filter(|s| config.wants(&s.id))
        .collect()
}

pub fn source_ids(config: &CollectorConfig) -> Vec<String> {
    build_catalog(config).into_iter().map(|s| s.id).collect()
}

struct Builder {
    id: &'static str,
    exchange: Exchange,
    url: String,
    kind: RequestKind,
    coverage: Coverage,
    magic: Option<&'static [u8]>,
}

impl Builder {
    fn download(id: &'static str, exchange: Exchange, url: &str) -> Self {
        Self {
            id,
            exchange,
            url: url.to_string(),
            kind: RequestKind::Download,
            coverage: Coverage::Archive,
            magic: None,
        }
    }

    fn api(id: &'static str, exchange: Exchange, url: &str) -> Self {
        Self {
            kind: RequestKind::Api,
            ..Self::download(id, exchange, url)
        }
    }

    fn magic(mut self, magic: &'static [u8]) -> Self {
        self.magic = Some(magic);
        self
    }

    fn snapshot(mut self) -> Self {
        self.coverage = Coverage::Snapshot;
        self
    }

    fn build(self, parser: impl SourceParser + 'static, columns: Vec<ColumnSpec>) -> SourceSpec {
        SourceSpec {
            id: self.id.to_string(),
            exchange: self.exchange,
            url_template: self.url,
            kind: self.kind,
            coverage: self.coverage,
            magic: self.magic.map(<[u8]>::to_vec),
            parser: Box::new(parser),
            columns,
        }
    }
}

fn col(metric: &str, header: &str, format: NumberFormat) -> ColumnSpec {
    ColumnSpec::new(metric, header, format)
}

// ── Daily archives ───────────────────────────────────────────────────

fn nse_fo(url: &str) -> SourceSpec {
    Builder::download("nse_fo", Exchange::Nse, url)
        .magic(ZIP_MAGIC)
        .build(
            ArchiveCsvParser::new(
                MemberPattern::new("op", ".csv"),
                &["NO_OF_CONT", "NO_OF_TRADE", "NOTION_VAL", "PR_VAL"],
            ),
            vec![
                col("NO_OF_CONT", "NSE_NO_OF_CONT", Integer),
                col("NO_OF_TRADE", "NSE_NO_OF_TRADE", Integer),
                col("NOTION_VAL", "NSE_NOTION_VAL", Currency),
                col("PR_VAL", "NSE_PR_VAL", Currency),
            ],
        )
}

fn bse_fo(url: &str) -> SourceSpec {
    Builder::download("bse_fo", Exchange::Bse, url).build(
        FilteredCsvParser::new(
            "Market Summary",
            "Product Type",
            4,
            &["IO", "IF"],
            vec![
                NamedColumn::new("BSE_TTL_TRADED_QTY", "Total Traded Quantity", 15),
                NamedColumn::new(
                    "BSE_TTL_TRADED_VAL",
                    "Total Traded Value (in Thousands)(absolute)",
                    16,
                ),
                NamedColumn::new("BSE_AVG_TRADED_PRICE", "Average Traded Price", 17),
                NamedColumn::new("BSE_NO_OF_TRADES", "No. of Trades", 18),
            ],
        ),
        vec![
            col("BSE_TTL_TRADED_QTY", "BSE_TTL_TRADED_QTY", Integer),
            col("BSE_TTL_TRADED_VAL", "BSE_TTL_TRADED_VAL", Currency),
            col("BSE_AVG_TRADED_PRICE", "BSE_AVG_TRADED_PRICE", Ratio),
            col("BSE_NO_OF_TRADES", "BSE_NO_OF_TRADES", Integer),
        ],
    )
}

/// Retail row of a category-turnover sheet. `metric_prefix` distinguishes
/// the equity sheet's metrics, `header_prefix` the output columns.
fn category_turnover(
    id: &'static str,
    url: &str,
    metric_prefix: &str,
    header_prefix: &str,
) -> SourceSpec {
    let metric = |name: &str| format!("{metric_prefix}RETAIL_{name}_CR");
    let header = |name: &str| format!("{header_prefix}RETAIL_{name}_CR");
    Builder::download(id, Exchange::Nse, url)
        .magic(OLE2_MAGIC)
        .build(
            RetailSheetParser::new("Retail", metric("BUY"), metric("SELL"), metric("AVG")),
            ["BUY", "SELL", "AVG"]
                .into_iter()
                .map(|n| ColumnSpec::new(metric(n), header(n), Currency))
                .collect(),
        )
}

fn margin_trading(url: &str) -> SourceSpec {
    const METRICS: [&str; 4] = [
        "NSE_MRG_OUTSTANDING_BOD_LAKHS",
        "NSE_MRG_FRESH_EXP_LAKHS",
        "NSE_MRG_EXP_LIQ_LAKHS",
        "NSE_MRG_NET_EOD_LAKHS",
    ];
    Builder::download("nse_mrg", Exchange::Nse, url)
        .magic(ZIP_MAGIC)
        .build(
            SerialRowsParser::new(
                MemberPattern::suffix(".csv"),
                &[
                    ("1", METRICS[0]),
                    ("2", METRICS[1]),
                    ("3", METRICS[2]),
                    ("4", METRICS[3]),
                ],
            ),
            METRICS.iter().map(|m| col(m, m, Currency)).collect(),
        )
}

fn participant_volumes(url: &str) -> SourceSpec {
    Builder::download("nse_part", Exchange::Nse, url).build(
        LabelledRowParser::new(
            "Client Type",
            "Client",
            vec![
                NamedColumn::new("NSE_CLT_TOTAL_LONG", "Total Long Contracts", 13),
                NamedColumn::new("NSE_CLT_FUT_IDX_LONG", "Future Index Long", 1),
                NamedColumn::new("NSE_CLT_FUT_IDX_SHORT", "Future Index Short", 2),
            ],
        ),
        vec![
            col("NSE_CLT_TOTAL_LONG", "NSE_CLT_TOTAL_LONG_CONT", Integer),
            col("NSE_CLT_FUT_IDX_LONG", "NSE_CLT_FUT_IDX_LONG", Integer),
            col("NSE_CLT_FUT_IDX_SHORT", "NSE_CLT_FUT_IDX_SHORT", Integer),
        ],
    )
}

// ── Snapshot APIs ────────────────────────────────────────────────────

fn registered_investors(
    id: &'static str,
    exchange: Exchange,
    url: &str,
    metric: &str,
    paths: &[&str],
) -> SourceSpec {
    Builder::api(id, exchange, url)
        .snapshot()
        .build(
            JsonScalarParser::new(metric, paths),
            vec![col(metric, metric, Integer)],
        )
}

fn market_turnover(url: &str) -> SourceSpec {
    let p = SegmentOrdersParser::new();
    Builder::api("nse_market_turnover", Exchange::Nse, url)
        .snapshot()
        .build(
            p,
            vec![
                col(SegmentOrdersParser::EQUITY_ORDERS, "NSE_EQUITY_TOTAL_NO_OF_ORDERS", Integer),
                col(SegmentOrdersParser::FO_ORDERS, "NSE_FO_TOTAL_NO_OF_ORDERS", Integer),
                col(SegmentOrdersParser::COMMODITY_ORDERS, "NSE_COMMODITY_TOTAL_NO_OF_ORDERS", Integer),
                col(SegmentOrdersParser::MF_ORDERS, "NSE_MF_NO_OF_ORDERS", Integer),
                col(SegmentOrdersParser::MF_TURNOVER, "NSE_MF_NOTIONAL_TURNOVER", Currency),
            ],
        )
}

// ── Month-batch historical APIs ──────────────────────────────────────

fn mfss(url: &str) -> SourceSpec {
    let fields = [
        ("MF_NOS_OF_SUB_ORDER", Integer),
        ("MF_TOT_SUB_AMT", Currency),
        ("MF_NOS_OF_RED_ORDER", Integer),
        ("MF_TOT_RED_AMT", Currency),
        ("MF_TOT_ORDER", Integer),
    ];
    Builder::api("nse_mfss", Exchange::Nse, url).build(
        JsonRecordsParser::new(
            &["MF_DATE"],
            fields.iter().map(|(f, _)| MetricField::new(*f, &[*f])).collect(),
        ),
        fields
            .iter()
            .map(|(f, fmt)| ColumnSpec::new(*f, format!("NSE_MFSS_{}", &f[3..]), *fmt))
            .collect(),
    )
}

/// TBG fields: metric, alternate source field names, format.
type TbgField = (&'static str, &'static [&'static str], NumberFormat);

const TBG_CM_FIELDS: &[TbgField] = &[
    ("CM_NOS_OF_SECURITY_TRADES", &["CDT_NOS_OF_SECURITY_TRADES", "NOS_OF_SECURITY_TRADES"], Integer),
    ("CM_NOS_OF_TRADES", &["CDT_NOS_OF_TRADES", "NOS_OF_TRADES"], Integer),
    ("CM_TRADES_QTY", &["CDT_TRADES_QTY", "TRADES_QTY"], Integer),
    ("CM_TRADES_VALUES", &["CDT_TRADES_VALUES", "TRADES_VALUES"], Currency),
];

const TBG_FO_FIELDS: &[TbgField] = &[
    ("FO_INDEX_FUT_QTY", &["Index_Futures_QTY", "INDEX_FUT_QTY"], Integer),
    ("FO_INDEX_FUT_VAL", &["Index_Futures_VAL", "INDEX_FUT_VAL"], Currency),
    ("FO_STOCK_FUT_QTY", &["Stock_Futures_QTY", "STOCK_FUT_QTY"], Integer),
    ("FO_STOCK_FUT_VAL", &["Stock_Futures_VAL", "STOCK_FUT_VAL"], Currency),
    ("FO_INDEX_OPT_QTY", &["Index_Options_QTY", "INDEX_OPT_QTY"], Integer),
    ("FO_INDEX_OPT_VAL", &["Index_Options_VAL", "INDEX_OPT_VAL"], Currency),
    ("FO_INDEX_OPT_PREM_VAL", &["Index_Options_PREM_VAL", "INDEX_OPT_PREM_VAL"], Currency),
    ("FO_INDEX_OPT_PUT_CALL_RATIO", &["Index_Options_PUT_CALL_RATIO", "INDEX_OPT_PUT_CALL_RATIO"], Ratio),
    ("FO_STOCK_OPT_QTY", &["Stock_Options_QTY", "STOCK_OPT_QTY"], Integer),
    ("FO_STOCK_OPT_VAL", &["Stock_Options_VAL", "STOCK_OPT_VAL"], Currency),
    ("FO_STOCK_OPT_PREM_VAL", &["Stock_Options_PREM_VAL", "STOCK_OPT_PREM_VAL"], Currency),
    ("FO_STOCK_OPT_PUT_CALL_RATIO", &["Stock_Options_PUT_CALL_RATIO", "STOCK_OPT_PUT_CALL_RATIO"], Ratio),
    ("FO_TOTAL_FO_QTY", &["F&O_Total_QTY", "Total_FO_QTY", "TOTAL_FO_QTY"], Integer),
    ("FO_TOTAL_FO_VAL", &["F&O_Total_VAL", "Total_FO_VAL", "TOTAL_FO_VAL"], Currency),
    ("FO_TOTAL_TRADED_PREM_VAL", &["Total_Traded_PREM_VAL", "TOTAL_TRADED_PREM_VAL"], Currency),
    ("FO_TOTAL_PUT_CALL_RATIO", &["F&O_Total_PUT_CALL_RATIO", "Total_PUT_CALL_RATIO", "TOTAL_PUT_CALL_RATIO"], Ratio),
];

const TBG_COM_FIELDS: &[TbgField] = &[
    ("COM_FUT_QTY", &["FUT_COM_TOT_TRADED_QTY", "FUT_QTY"], Integer),
    ("COM_FUT_VAL", &["FUT_COM_TOT_TRADED_VAL", "FUT_VAL"], Currency),
    ("COM_OPT_QTY", &["OPT_COM_TOT_TRADED_QTY", "OPT_QTY"], Integer),
    ("COM_OPT_VAL", &["OPT_COM_TOT_TRADED_VAL", "OPT_VAL"], Currency),
    ("COM_OPT_PREM", &["OPT_COM_PREM", "OPT_PREM"], Currency),
    ("COM_TOTAL_QTY", &["TOTAL_TRADED_QTY", "TOTAL_QTY"], Integer),
    ("COM_TOTAL_VAL", &["TOTAL_TRADED_VAL", "TOTAL_VAL"], Currency),
];

fn tbg(id: &'static str, url: &str, date_fields: &[&str], fields: &[TbgField]) -> SourceSpec {
    Builder::api(id, Exchange::Nse, url).build(
        JsonRecordsParser::new(
            date_fields,
            fields
                .iter()
                .map(|(metric, alternates, _)| MetricField::new(*metric, alternates))
                .collect(),
        ),
        fields
            .iter()
            .map(|(metric, _, fmt)| ColumnSpec::new(*metric, format!("NSE_TBG_{metric}"), *fmt))
            .collect(),
    )
}

fn tbg_cm(url: &str) -> SourceSpec {
    tbg("nse_tbg_cm", url, &["F_TIMESTAMP", "CDT_DATE_ORDER", "date"], TBG_CM_FIELDS)
}

fn tbg_fo(url: &str) -> SourceSpec {
    tbg("nse_tbg_fo", url, &["date", "DATE_ORDER"], TBG_FO_FIELDS)
}

fn tbg_commodity(url: &str) -> SourceSpec {
    tbg("nse_tbg_commodity", url, &["date", "DATE_ORDER"], TBG_COM_FIELDS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn header_order_matches_published_layout() {
        let catalog = build_catalog(&CollectorConfig::default());
        let headers: Vec<&str> = catalog.iter().flat_map(|s| s.headers()).collect();

        assert_eq!(headers.len(), 4 + 4 + 3 + 3 + 4 + 3 + 2 + 5 + 5 + 27);
        assert_eq!(&headers[..5], &[
            "NSE_NO_OF_CONT",
            "NSE_NO_OF_TRADE",
            "NSE_NOTION_VAL",
            "NSE_PR_VAL",
            "BSE_TTL_TRADED_QTY",
        ]);
        assert_eq!(headers[8], "NSE_CAT_RETAIL_BUY_CR");
        assert_eq!(headers[11], "NSE_EQ_RETAIL_BUY_CR");
        assert_eq!(headers[18], "NSE_CLT_TOTAL_LONG_CONT");
        assert_eq!(&headers[21..23], &["NSE_REG_INVESTORS", "BSE_REG_INVESTORS"]);
        assert_eq!(headers[23], "NSE_MFSS_NOS_OF_SUB_ORDER");
        assert_eq!(headers[28], "NSE_EQUITY_TOTAL_NO_OF_ORDERS");
        assert_eq!(headers[33], "NSE_TBG_CM_NOS_OF_SECURITY_TRADES");
        assert_eq!(*headers.last().unwrap(), "NSE_TBG_COM_TOTAL_VAL");

        let unique: HashSet<&str> = headers.iter().copied().collect();
        assert_eq!(unique.len(), headers.len(), "duplicate header");
    }

    #[test]
    fn ids_are_unique_and_selectable() {
        let mut config = CollectorConfig::default();
        let ids = source_ids(&config);
        assert_eq!(ids.len(), 13);
        assert_eq!(ids.iter().collect::<HashSet<_>>().len(), 13);

        config.sources = Some(vec!["bse_fo".into(), "nse_tbg_fo".into()]);
        let picked: Vec<String> = selected_sources(&config).into_iter().map(|s| s.id).collect();
        assert_eq!(picked, vec!["bse_fo", "nse_tbg_fo"]);
    }

    #[test]
    fn coverage_and_exchange_assignment() {
        let catalog = build_catalog(&CollectorConfig::default());
        let get = |id: &str| catalog.iter().find(|s| s.id == id).unwrap();

        assert_eq!(get("bse_fo").exchange, Exchange::Bse);
        assert_eq!(get("bse_reg_investors").exchange, Exchange::Bse);
        assert_eq!(get("nse_market_turnover").coverage, Coverage::Snapshot);
        assert_eq!(get("nse_tbg_cm").coverage, Coverage::Archive);
        assert_eq!(get("nse_fo").magic.as_deref(), Some(ZIP_MAGIC));
        assert_eq!(get("nse_cat").magic.as_deref(), Some(OLE2_MAGIC));
        assert_eq!(get("nse_mfss").kind, RequestKind::Api);
    }

    #[test]
    fn month_batch_sources_share_a_request_per_month() {
        let catalog = build_catalog(&CollectorConfig::default());
        let fo = catalog.iter().find(|s| s.id == "nse_tbg_fo").unwrap();
        let today = chrono::NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let a = fo.request_url(chrono::NaiveDate::from_ymd_opt(2025, 2, 3).unwrap(), today);
        let b = fo.request_url(chrono::NaiveDate::from_ymd_opt(2025, 2, 28).unwrap(), today);
        assert_eq!(a, b);
        assert!(a.ends_with("fo/tbg/daily?month=Feb&year=2025"));
    }
}

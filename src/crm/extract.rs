//! CRM markup extraction
//!
//! Pure functions over grid and record-page HTML. The CRM UI can change
//! under us, so every function degrades to "nothing found" instead of
//! failing: rows that do not match are skipped and logged.

use std::sync::OnceLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use thiserror::Error;

use crate::models::{DeviceExtra, EntityReference};

const LIST_ROW: &str = "tr.ms-crm-List-Row";
const LIST_LINK: &str = "a.ms-crm-List-Link";

/// Grid column holding the serial number link (0-based)
pub const SERIAL_NUMBER_COLUMN: usize = 1;
/// Grid column holding the record status (0-based)
pub const STATUS_COLUMN: usize = 13;

const ACTIVE_STATUS: &str = "Active";

/// Non-fatal miss while reading a record page; defaults are substituted
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ExtractionDegraded {
    #[error("no _entityData assignment in any script block")]
    MissingEntityData,
    #[error("_entityData is not valid JSON: {0}")]
    InvalidJson(String),
}

fn entity_data_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"var _entityData = '(.*?)';").expect("static regex"))
}

fn selector(css: &'static str) -> Selector {
    Selector::parse(css).expect("static selector")
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Account names from an accounts grid: first list link of each list row
pub fn account_names(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let rows = selector(LIST_ROW);
    let link = selector(LIST_LINK);

    document
        .select(&rows)
        .filter_map(|row| row.select(&link).next())
        .map(element_text)
        .filter(|name| !name.is_empty())
        .collect()
}

/// Serial numbers of wireless rows whose status reads exactly "Active"
pub fn active_serials(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let rows = selector(LIST_ROW);
    let cell = selector("td");
    let link = selector(LIST_LINK);

    let mut serials = Vec::new();

    for (index, row) in document.select(&rows).enumerate() {
        let row_number = index + 1;
        let cells: Vec<ElementRef<'_>> = row.select(&cell).collect();

        if cells.len() <= SERIAL_NUMBER_COLUMN.max(STATUS_COLUMN) {
            tracing::warn!(
                "[CRM] Row {} has {} cells, expected more than {}",
                row_number,
                cells.len(),
                STATUS_COLUMN
            );
            continue;
        }

        let serial: String = cells[SERIAL_NUMBER_COLUMN]
            .select(&link)
            .map(element_text)
            .collect();
        let status = element_text(cells[STATUS_COLUMN]);

        if serial.is_empty() {
            tracing::warn!("[CRM] No serial number found in row {}", row_number);
        } else if status != ACTIVE_STATUS {
            tracing::warn!(
                "[CRM] Row {} ({}) has status '{}', not '{}'",
                row_number,
                serial,
                status,
                ACTIVE_STATUS
            );
        } else {
            serials.push(serial);
        }
    }

    serials
}

/// Entity type code (`table[oname]`) and object id (`tr[oid]`) of the first
/// record in a grid response
pub fn entity_reference(html: &str) -> EntityReference {
    let document = Html::parse_document(html);

    let first_attr = |css: &'static str, attr: &str| {
        document
            .select(&selector(css))
            .next()
            .and_then(|el| el.value().attr(attr))
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    EntityReference {
        entity_type_id: first_attr("table[oname]", "oname"),
        object_id: first_attr("tr[oid]", "oid"),
    }
}

/// Wireless plan and monthly rate from a record page, "N/A" where missing
pub fn embedded_entity_data(html: &str) -> DeviceExtra {
    match parse_entity_data(html) {
        Ok(extra) => extra,
        Err(reason) => {
            tracing::warn!("[CRM] Record page degraded: {}", reason);
            DeviceExtra::not_available()
        }
    }
}

pub fn parse_entity_data(html: &str) -> Result<DeviceExtra, ExtractionDegraded> {
    let raw = find_entity_data(html).ok_or(ExtractionDegraded::MissingEntityData)?;
    let decoded = unescape_js(&raw);
    let data: Value = serde_json::from_str(&decoded)
        .map_err(|e| ExtractionDegraded::InvalidJson(e.to_string()))?;

    let wireless_plan =
        field_value(&data, "nl_wirelessplan").unwrap_or_else(|| DeviceExtra::NOT_AVAILABLE.into());
    let monthly_rate = field_value(&data, "nl_monthlyrate")
        .map(|rate| format!("${}", rate))
        .unwrap_or_else(|| DeviceExtra::NOT_AVAILABLE.into());

    Ok(DeviceExtra {
        wireless_plan,
        monthly_rate,
    })
}

/// Last `var _entityData = '...';` literal across all script blocks
fn find_entity_data(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let scripts = selector("script");
    let pattern = entity_data_pattern();

    document
        .select(&scripts)
        .filter_map(|script| {
            let body: String = script.text().collect();
            pattern
                .captures(&body)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
        })
        .filter(|literal| !literal.is_empty())
        .last()
}

/// `{"field": {"value": ...}}` → non-empty string
fn field_value(data: &Value, field: &str) -> Option<String> {
    match data.get(field)?.get("value")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(true) => Some("true".to_string()),
        _ => None,
    }
}

/// Undo JavaScript string-literal escaping: `\xHH`, `\uHHHH`, `\'`, `\"`
/// and `\\`. Other escapes are left for the JSON parser.
pub fn unescape_js(literal: &str) -> String {
    let mut out = String::with_capacity(literal.len());
    let mut chars = literal.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }

        match chars.peek().copied() {
            Some('x') => {
                chars.next();
                push_hex_escape(&mut out, &mut chars, 2, 'x');
            }
            Some('u') => {
                chars.next();
                push_hex_escape(&mut out, &mut chars, 4, 'u');
            }
            Some(quote @ ('\'' | '"' | '\\')) => {
                chars.next();
                out.push(quote);
            }
            _ => out.push('\\'),
        }
    }

    out
}

fn push_hex_escape(
    out: &mut String,
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    width: usize,
    marker: char,
) {
    let digits: String = chars.clone().take(width).collect();
    let decoded = (digits.len() == width && digits.chars().all(|d| d.is_ascii_hexdigit()))
        .then(|| u32::from_str_radix(&digits, 16).ok())
        .flatten()
        .and_then(char::from_u32);

    match decoded {
        Some(ch) => {
            for _ in 0..width {
                chars.next();
            }
            out.push(ch);
        }
        None => {
            out.push('\\');
            out.push(marker);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wireless_row(serial: &str, status: &str, cells: usize) -> String {
        let mut row = String::from(r#"<tr class="ms-crm-List-Row" oid="{11111111-2222}">"#);
        for i in 0..cells {
            let content = match i {
                SERIAL_NUMBER_COLUMN => {
                    format!(r##"<a class="ms-crm-List-Link" href="#">{}</a>"##, serial)
                }
                STATUS_COLUMN => format!("  {}  ", status),
                _ => format!("c{}", i),
            };
            row.push_str(&format!("<td>{}</td>", content));
        }
        row.push_str("</tr>");
        row
    }

    fn grid(rows: &[String]) -> String {
        format!(
            r#"<html><body><table class="ms-crm-List-Data" oname="10014"><tbody>{}</tbody></table></body></html>"#,
            rows.concat()
        )
    }

    #[test]
    fn test_account_names() {
        let html = r#"<table><tbody>
            <tr class="ms-crm-List-Row"><td><a class="ms-crm-List-Link">  Acme Corp </a><a class="ms-crm-List-Link">second</a></td></tr>
            <tr class="ms-crm-List-Row"><td>no link here</td></tr>
            <tr class="other-row"><td><a class="ms-crm-List-Link">Ignored</a></td></tr>
            <tr class="ms-crm-List-Row"><td><a class="ms-crm-List-Link">Smith &amp; Sons</a></td></tr>
        </tbody></table>"#;

        assert_eq!(account_names(html), vec!["Acme Corp", "Smith & Sons"]);
    }

    #[test]
    fn test_unexpected_markup_yields_nothing() {
        for html in ["", "<html></html>", "not html at all", "<table><tr><td>x</td></tr></table>"] {
            assert!(account_names(html).is_empty());
            assert!(active_serials(html).is_empty());
        }
    }

    #[test]
    fn test_active_serials_filters_status() {
        let html = grid(&[
            wireless_row("SN123", "Active", 14),
            wireless_row("SN456", "Inactive", 14),
            wireless_row("SN789", "active", 14),
            wireless_row("SN999", "Active", 16),
        ]);

        assert_eq!(active_serials(&html), vec!["SN123", "SN999"]);
    }

    #[test]
    fn test_active_serials_skips_short_and_empty_rows() {
        let html = grid(&[
            wireless_row("SN-SHORT", "Active", 13),
            wireless_row("", "Active", 14),
            wireless_row("SN-OK", "Active", 14),
        ]);

        assert_eq!(active_serials(&html), vec!["SN-OK"]);
    }

    #[test]
    fn test_entity_reference() {
        let html = grid(&[wireless_row("SN123", "Active", 14)]);
        assert_eq!(
            entity_reference(&html),
            EntityReference {
                entity_type_id: Some("10014".into()),
                object_id: Some("{11111111-2222}".into()),
            }
        );

        let no_rows = r#"<table oname="10014"><tbody></tbody></table>"#;
        let reference = entity_reference(no_rows);
        assert_eq!(reference.entity_type_id.as_deref(), Some("10014"));
        assert_eq!(reference.object_id, None);
        assert!(reference.complete().is_none());

        assert_eq!(entity_reference("<div></div>"), EntityReference::default());
    }

    #[test]
    fn test_embedded_entity_data() {
        let html = r#"<html><head>
            <script type="text/javascript">var other = 1;</script>
            <script type="text/javascript">var _entityData = '{"nl_wirelessplan":{"value":"Gold"},"nl_monthlyrate":{"value":"49.99"}}';</script>
        </head></html>"#;

        assert_eq!(
            embedded_entity_data(html),
            DeviceExtra {
                wireless_plan: "Gold".into(),
                monthly_rate: "$49.99".into(),
            }
        );
    }

    #[test]
    fn test_embedded_entity_data_hex_escaped() {
        let html = r#"<script type="text/javascript">var _entityData = '{\x22nl_wirelessplan\x22:{\x22value\x22:\x22Unlimited & More\x22},\x22nl_monthlyrate\x22:{\x22value\x22:35}}';</script>"#;

        let extra = embedded_entity_data(html);
        assert_eq!(extra.wireless_plan, "Unlimited & More");
        assert_eq!(extra.monthly_rate, "$35");
    }

    #[test]
    fn test_embedded_entity_data_defaults() {
        assert_eq!(
            embedded_entity_data("<html><script>var x = 1;</script></html>"),
            DeviceExtra::not_available()
        );
        assert_eq!(
            parse_entity_data("<p>nothing</p>"),
            Err(ExtractionDegraded::MissingEntityData)
        );

        let broken = r#"<script>var _entityData = '{not json';</script>"#;
        assert!(matches!(
            parse_entity_data(broken),
            Err(ExtractionDegraded::InvalidJson(_))
        ));
        assert_eq!(embedded_entity_data(broken), DeviceExtra::not_available());

        let partial = r#"<script>var _entityData = '{"nl_wirelessplan":{"value":""}}';</script>"#;
        assert_eq!(embedded_entity_data(partial), DeviceExtra::not_available());
    }

    #[test]
    fn test_unescape_js() {
        assert_eq!(unescape_js(r"\x41B"), "AB");
        assert_eq!(unescape_js(r#"it\'s \"q\" \\ done"#), r#"it's "q" \ done"#);
        assert_eq!(unescape_js(r"keep \n and \xZZ"), r"keep \n and \xZZ");
        assert_eq!(unescape_js(r"trailing \"), r"trailing \");
    }
}

//! Decoder for one line of the proxy's CSV statistics output.
//!
//! Fields are addressed by position, not by header name; the positions
//! below are the proxy's stable stats schema.

use fleet_core::{FleetError, FleetResult};

/// Position of the proxy (listener) name (`pxname`).
pub const PROXY_NAME: usize = 0;
/// Position of the service name (`svname`).
pub const SERVICE_NAME: usize = 1;
/// Position of the current queue length (`qcur`).
pub const QUEUE_CURRENT: usize = 2;
/// Position of the session rate over the last second (`rate`).
pub const SESSION_RATE: usize = 33;
/// Position of the HTTP request rate (`req_rate`).
pub const REQUEST_RATE: usize = 46;
/// Records narrower than this are header lines or truncated output.
pub const MIN_FIELDS: usize = REQUEST_RATE + 1;

/// Which side of a listener a stats row describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceRole {
    /// Aggregate row for incoming traffic; carries the request rate.
    Frontend,
    /// Aggregate row for the server pool; carries the queue depth.
    Backend,
    /// Per-server rows and anything else.
    Other,
}

impl ServiceRole {
    fn classify(service_name: &str) -> Self {
        match service_name {
            "FRONTEND" => ServiceRole::Frontend,
            "BACKEND" => ServiceRole::Backend,
            _ => ServiceRole::Other,
        }
    }
}

/// A decoded statistics row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsSample {
    /// Listener the row belongs to, e.g. `gae_shop`.
    pub proxy_name: String,
    pub role: ServiceRole,
    pub service_name: String,
    pub queue_current: u64,
    pub request_rate: u64,
    pub session_rate_last_second: u64,
}

/// Decode one CSV statistics line.
///
/// Lines with fewer than [`MIN_FIELDS`] fields are rejected. Numeric
/// fields that do not start with digits read as zero.
pub fn parse_record(line: &str) -> FleetResult<StatsSample> {
    let fields: Vec<&str> = line.trim_end_matches(['\r', '\n']).split(',').collect();
    if fields.len() < MIN_FIELDS {
        return Err(FleetError::MalformedRecord(format!(
            "expected at least {MIN_FIELDS} fields, found {}",
            fields.len()
        )));
    }

    let service_name = fields[SERVICE_NAME].to_string();
    Ok(StatsSample {
        proxy_name: fields[PROXY_NAME].to_string(),
        role: ServiceRole::classify(&service_name),
        service_name,
        queue_current: coerce_count(fields[QUEUE_CURRENT]),
        request_rate: coerce_count(fields[REQUEST_RATE]),
        session_rate_last_second: coerce_count(fields[SESSION_RATE]),
    })
}

/// The `pxname` column of a raw line, without decoding the rest.
pub fn proxy_name(line: &str) -> &str {
    line.split(',').next().unwrap_or_default()
}

/// Lenient integer read: the leading run of digits, or 0.
///
/// Negative values are clamped to 0 since every counter is non-negative.
fn coerce_count(field: &str) -> u64 {
    let s = field.trim_start();
    if s.starts_with('-') {
        return 0;
    }
    let s = s.strip_prefix('+').unwrap_or(s);
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    s[..end].parse::<u64>().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a stats line with `width` fields and the given overrides.
    fn line(width: usize, overrides: &[(usize, &str)]) -> String {
        let mut fields = vec![String::new(); width];
        for (pos, value) in overrides {
            fields[*pos] = value.to_string();
        }
        fields.join(",")
    }

    #[test]
    fn forty_six_fields_are_rejected() {
        let l = line(46, &[(0, "gae_app"), (1, "BACKEND"), (2, "7")]);
        assert!(matches!(parse_record(&l), Err(FleetError::MalformedRecord(_))));
    }

    #[test]
    fn backend_row_reads_queue_depth() {
        let l = line(47, &[(0, "gae_app"), (1, "BACKEND"), (2, "7"), (46, "")]);
        let sample = parse_record(&l).unwrap();
        assert_eq!(sample.role, ServiceRole::Backend);
        assert_eq!(sample.queue_current, 7);
        assert_eq!(sample.request_rate, 0);
    }

    #[test]
    fn frontend_row_reads_request_rate() {
        let l = line(
            60,
            &[(0, "gae_app"), (1, "FRONTEND"), (33, "4"), (46, "12")],
        );
        let sample = parse_record(&l).unwrap();
        assert_eq!(sample.role, ServiceRole::Frontend);
        assert_eq!(sample.request_rate, 12);
        assert_eq!(sample.session_rate_last_second, 4);
        assert_eq!(sample.service_name, "FRONTEND");
        assert_eq!(sample.proxy_name, "gae_app");
    }

    #[test]
    fn proxy_name_is_first_column() {
        assert_eq!(proxy_name("gae_shopping,FRONTEND,0"), "gae_shopping");
        assert_eq!(proxy_name("gae_shop"), "gae_shop");
        assert_eq!(proxy_name(""), "");
    }

    #[test]
    fn server_rows_are_other() {
        let l = line(47, &[(0, "gae_app"), (1, "gae_app-0"), (2, "3")]);
        assert_eq!(parse_record(&l).unwrap().role, ServiceRole::Other);
    }

    #[test]
    fn role_match_is_exact() {
        let l = line(47, &[(1, "frontend")]);
        assert_eq!(parse_record(&l).unwrap().role, ServiceRole::Other);
    }

    #[test]
    fn trailing_newline_is_ignored() {
        let l = format!("{}\n", line(47, &[(1, "BACKEND"), (46, "9")]));
        assert_eq!(parse_record(&l).unwrap().request_rate, 9);
    }

    #[test]
    fn header_line_is_rejected() {
        assert!(parse_record("# pxname,svname,qcur,qmax").is_err());
        assert!(parse_record("").is_err());
    }

    #[test]
    fn numeric_coercion_is_lenient() {
        assert_eq!(coerce_count("42"), 42);
        assert_eq!(coerce_count("12abc"), 12);
        assert_eq!(coerce_count(" 8"), 8);
        assert_eq!(coerce_count("+5"), 5);
        assert_eq!(coerce_count("abc"), 0);
        assert_eq!(coerce_count(""), 0);
        assert_eq!(coerce_count("-3"), 0);
    }
}

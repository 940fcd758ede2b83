use crate::domain::errors::PushError;
use crate::domain::metric_set::{LabelSet, validate_label_name};
use url::Url;

/// Parse a collector base URL, assuming `http://` when no scheme is given.
pub fn parse_collector_url(raw: &str) -> Result<Url, PushError> {
    let raw = raw.trim();
    let with_scheme = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("http://{}", raw)
    };
    let url = Url::parse(&with_scheme)
        .map_err(|e| PushError::InvalidTarget(format!("'{}': {}", raw, e)))?;
    if url.cannot_be_a_base() || url.host_str().is_none() {
        return Err(PushError::InvalidTarget(format!(
            "'{}' is not a usable base URL",
            raw
        )));
    }
    Ok(url)
}

/// `<base>/metrics/job/<job>[/<label>/<value>...]`, one escaped segment each.
///
/// Empty label values use the `<label>@base64/=` form, since an empty path
/// segment would be dropped by the collector.
pub fn push_url(base: &Url, job: &str, grouping_key: &LabelSet) -> Result<String, PushError> {
    if job.is_empty() {
        return Err(PushError::InvalidTarget(
            "job name must not be empty".to_string(),
        ));
    }

    let mut url = base.clone();
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| PushError::InvalidTarget(format!("{} cannot be a base URL", base)))?;
        segments.pop_if_empty().extend(["metrics", "job", job]);

        for (name, value) in grouping_key {
            validate_label_name(name).map_err(|e| PushError::InvalidTarget(e.to_string()))?;
            if value.is_empty() {
                segments.push(&format!("{}@base64", name)).push("=");
            } else {
                segments.push(name).push(value);
            }
        }
    }
    Ok(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::metric_set::labels;

    #[test]
    fn test_scheme_defaults_to_http() {
        let url = parse_collector_url("prometheus-pushgateway:9091").unwrap();
        assert_eq!(url.as_str(), "http://prometheus-pushgateway:9091/");

        let url = parse_collector_url("https://gw.example.com/base").unwrap();
        assert_eq!(url.scheme(), "https");
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(parse_collector_url("http://").is_err());
        assert!(parse_collector_url("http://exa mple.com").is_err());
    }

    #[test]
    fn test_job_only_url() {
        let base = parse_collector_url("gw:9091").unwrap();
        let url = push_url(&base, "batch-job-17", &LabelSet::new()).unwrap();
        assert_eq!(url, "http://gw:9091/metrics/job/batch-job-17");
    }

    #[test]
    fn test_grouping_key_segments_are_escaped() {
        let base = parse_collector_url("http://gw:9091/prefix/").unwrap();
        let key = labels([("pod", "web/1"), ("instance", "host a")]);
        let url = push_url(&base, "demo-app-1", &key).unwrap();
        assert_eq!(
            url,
            "http://gw:9091/prefix/metrics/job/demo-app-1/instance/host%20a/pod/web%2F1"
        );
    }

    #[test]
    fn test_empty_label_value_uses_base64_form() {
        let base = parse_collector_url("gw:9091").unwrap();
        let url = push_url(&base, "demo", &labels([("pod", "")])).unwrap();
        assert_eq!(url, "http://gw:9091/metrics/job/demo/pod@base64/=");
    }

    #[test]
    fn test_invalid_targets() {
        let base = parse_collector_url("gw:9091").unwrap();
        assert!(matches!(
            push_url(&base, "", &LabelSet::new()),
            Err(PushError::InvalidTarget(_))
        ));
        assert!(matches!(
            push_url(&base, "demo", &labels([("bad-name", "x")])),
            Err(PushError::InvalidTarget(_))
        ));
    }
}

//! Tests for records, summaries and artifacts.

#[cfg(test)]
mod tests {
    use crate::core::{fields, Artifact, Record, RecordStatus, Shape, StepKind, StepStamp, StepSummary};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn listing(url: &str, index: usize) -> Record {
        Record::discovered("aspirin", "manual", url, index)
    }

    #[test]
    fn test_identifier_follows_normalized_url() {
        let a = listing("https://shop.ch/a?utm_source=x", 0);
        let b = listing("https://SHOP.ch/a", 1);
        assert_eq!(a.id(), b.id());
        assert_eq!(a.url(), "https://shop.ch/a");
        assert_eq!(a.original_url(), "https://shop.ch/a?utm_source=x");
    }

    #[test]
    fn test_non_url_reference_is_kept_verbatim() {
        let record = listing(" image:1234 ", 0);
        assert_eq!(record.url(), "image:1234");
    }

    #[test]
    fn test_derive_records_provenance() {
        let stamp = StepStamp::new("structured_extraction", 3);
        let mut record = listing("https://shop.ch/a", 0);
        record.derive(fields::PRICE, json!(12.5), &stamp).unwrap();

        let provenance = record.provenance(fields::PRICE).unwrap();
        assert_eq!(provenance.step, "structured_extraction");
        assert_eq!(provenance.ordinal, 3);
        assert_eq!(provenance.model_version, None);
        assert_eq!(record.derived(fields::PRICE), Some(&json!(12.5)));
    }

    #[test]
    fn test_owner_may_overwrite_its_field() {
        let stamp = StepStamp::new("page_type", 5);
        let mut record = listing("https://shop.ch/a", 0);
        record
            .derive_with_model(fields::PAGE_TYPE, json!("other"), &stamp, "v1")
            .unwrap();
        record
            .derive_with_model(fields::PAGE_TYPE, json!("ecommerce_product"), &stamp, "v2")
            .unwrap();

        let provenance = record.provenance(fields::PAGE_TYPE).unwrap();
        assert_eq!(provenance.value, json!("ecommerce_product"));
        assert_eq!(provenance.model_version.as_deref(), Some("v2"));
    }

    #[test]
    fn test_other_step_may_not_overwrite() {
        let mut record = listing("https://shop.ch/a", 0);
        record
            .derive(fields::DOMAIN, json!("shop.ch"), &StepStamp::new("country_filter", 4))
            .unwrap();

        let err = record
            .derive(fields::DOMAIN, json!("x"), &StepStamp::new("ranker", 12))
            .unwrap_err();
        assert_eq!(err.owner, "country_filter");
        assert_eq!(err.writer, "ranker");
        assert_eq!(record.derived(fields::DOMAIN), Some(&json!("shop.ch")));
    }

    #[test]
    fn test_status_transitions() {
        let stamp = StepStamp::new("country_filter", 4);
        let mut excluded = listing("https://a.ch", 0);
        excluded.exclude(&stamp, "blacklisted domain");
        assert!(excluded.is_excluded());
        assert!(!excluded.is_active());
        assert_eq!(
            excluded.status(),
            &RecordStatus::Excluded {
                step: "country_filter".to_string(),
                ordinal: 4,
                reason: "blacklisted domain".to_string(),
            }
        );

        let mut failed = listing("https://b.ch", 1);
        failed.fail(&StepStamp::new("relevance", 9), "timeout");
        assert!(failed.failed_by("relevance"));
        assert!(!failed.failed_by("suspicion"));
    }

    #[test]
    fn test_record_serialization_is_stable() {
        let stamp = StepStamp::new("structured_extraction", 3);
        let mut record = listing("https://shop.ch/a", 0).with_raw("title", json!("Aspirin"));
        record.derive(fields::CURRENCY, json!("CHF"), &stamp).unwrap();
        record.derive(fields::PRICE, json!(9.9), &stamp).unwrap();

        let first = serde_json::to_string(&record).unwrap();
        let second = serde_json::to_string(&record.clone()).unwrap();
        assert_eq!(first, second);
        assert!(first.find("\"currency\"").unwrap() < first.find("\"price\"").unwrap());

        let back: Record = serde_json::from_str(&first).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_summary_counts() {
        let stamp = StepStamp::new("f", 1);
        let mut records = vec![listing("https://a.ch", 0), listing("https://b.ch", 1), listing("https://c.ch", 2)];
        records[1].exclude(&stamp, "rule");
        records[2].fail(&stamp, "boom");

        let summary = StepSummary::from_records(&records).with_detail("manual", 3);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.active, 1);
        assert_eq!(summary.excluded, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(
            summary.to_string(),
            "3 records: 1 active, 1 excluded, 1 failed (manual=3)"
        );
    }

    #[test]
    fn test_artifact_file_name_and_partial() {
        let artifact = Artifact::new(
            "run",
            "discovery",
            1,
            StepKind::Extractor,
            Shape::empty(),
            vec![listing("https://a.ch", 0)],
        );
        assert_eq!(artifact.file_name(), "01_discovery.json");
        assert!(artifact.complete);
        assert_eq!(artifact.summary.active, 1);
        assert!(!artifact.partial().complete);
    }
}

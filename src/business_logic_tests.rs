#[cfg(test)]
mod tests {
    use crate::commands::activity::ActivityDetail;
    use crate::commands::analytics::{period_bounds, refill_trend};
    use crate::commands::boxes::{make_box_id, next_box_number, parse_box_sequence};
    use crate::commands::product::{classify, validate_batch, UploadRow};
    use crate::db::Product;
    use crate::error::AppError;

    fn product(sku: &str) -> Product {
        Product {
            sku: sku.to_string(),
            branch: "Branch 1".to_string(),
            name: format!("Item {}", sku),
            price: 10.0,
            rack_number: "R1".to_string(),
            stock_new: 5,
            updated_at: None,
        }
    }

    fn row(sku: &str) -> UploadRow {
        UploadRow {
            sku: sku.to_string(),
            name: format!("Item {}", sku),
            price: 10.0,
            rack_number: "R1".to_string(),
            stock_new: 5,
        }
    }

    #[test]
    fn test_classify_partitions_by_sku() {
        // catalog = {A, B}, batch = {B, C}
        let result = classify(vec![product("A"), product("B")], &[row("B"), row("C")]);

        assert_eq!(result.matched.len(), 1);
        assert_eq!(result.matched[0].sku, "B");
        assert_eq!(result.missing.len(), 1);
        assert_eq!(result.missing[0].sku, "A");
        assert_eq!(result.surplus.len(), 1);
        assert_eq!(result.surplus[0].sku, "C");
    }

    #[test]
    fn test_classify_empty_catalog_is_all_surplus() {
        let result = classify(vec![], &[row("X"), row("Y")]);
        assert!(result.matched.is_empty());
        assert!(result.missing.is_empty());
        assert_eq!(result.surplus.len(), 2);
    }

    #[test]
    fn test_classify_empty_batch_is_all_missing() {
        let result = classify(vec![product("A"), product("B")], &[]);
        assert!(result.matched.is_empty());
        assert_eq!(result.missing.len(), 2);
        assert!(result.surplus.is_empty());
    }

    #[test]
    fn test_classify_sets_are_disjoint_and_cover() {
        let catalog = vec![product("A"), product("B"), product("C")];
        let batch = [row("B"), row("C"), row("D"), row("E")];
        let result = classify(catalog, &batch);

        let mut skus: Vec<&str> = result
            .matched
            .iter()
            .map(|p| p.sku.as_str())
            .chain(result.missing.iter().map(|p| p.sku.as_str()))
            .chain(result.surplus.iter().map(|r| r.sku.as_str()))
            .collect();
        skus.sort();
        let before = skus.len();
        skus.dedup();
        // No SKU appears in two sets, and every SKU from either source appears.
        assert_eq!(skus.len(), before);
        assert_eq!(skus, vec!["A", "B", "C", "D", "E"]);
    }

    #[test]
    fn test_classify_sorted_by_sku() {
        let result = classify(
            vec![product("Z"), product("A"), product("M")],
            &[row("Q"), row("B")],
        );
        let missing: Vec<&str> = result.missing.iter().map(|p| p.sku.as_str()).collect();
        assert_eq!(missing, vec!["A", "M", "Z"]);
        let surplus: Vec<&str> = result.surplus.iter().map(|r| r.sku.as_str()).collect();
        assert_eq!(surplus, vec!["B", "Q"]);
    }

    #[test]
    fn test_classify_dedupes_surplus() {
        let result = classify(vec![], &[row("X"), row("X")]);
        assert_eq!(result.surplus.len(), 1);
    }

    #[test]
    fn test_validate_batch_rejects_bad_rows() {
        let ok = [row("A")];
        assert!(validate_batch("Branch 1", &ok).is_ok());

        assert!(matches!(
            validate_batch("Branch 1", &[]),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            validate_batch("", &ok),
            Err(AppError::Validation(_))
        ));

        let mut zero_price = row("A");
        zero_price.price = 0.0;
        assert!(validate_batch("Branch 1", &[zero_price]).is_err());

        let mut negative_price = row("A");
        negative_price.price = -3.5;
        assert!(validate_batch("Branch 1", &[negative_price]).is_err());

        let mut negative_stock = row("A");
        negative_stock.stock_new = -1;
        assert!(validate_batch("Branch 1", &[negative_stock]).is_err());

        let mut blank_sku = row("A");
        blank_sku.sku = "  ".to_string();
        assert!(validate_batch("Branch 1", &[blank_sku]).is_err());

        // One bad row poisons the whole batch.
        let mut bad = row("B");
        bad.price = -1.0;
        assert!(validate_batch("Branch 1", &[row("A"), bad]).is_err());
    }

    #[test]
    fn test_box_number_sequencing() {
        assert_eq!(next_box_number("A", None), "A001");
        assert_eq!(next_box_number("A", Some("A001")), "A002");
        assert_eq!(next_box_number("B", Some("B099")), "B100");
        assert_eq!(next_box_number("C", Some("C999")), "C1000");
        // Unparseable latest number falls back to the start of the sequence.
        assert_eq!(next_box_number("A", Some("garbage")), "A001");
    }

    #[test]
    fn test_parse_box_sequence() {
        assert_eq!(parse_box_sequence("A001"), Some(1));
        assert_eq!(parse_box_sequence("C042"), Some(42));
        assert_eq!(parse_box_sequence("42"), None);
        assert_eq!(parse_box_sequence("Axx"), None);
        assert_eq!(parse_box_sequence(""), None);
    }

    #[test]
    fn test_box_id_strips_branch_spaces() {
        assert_eq!(make_box_id("A001", "Branch 1"), "A001-Branch1");
        assert_eq!(make_box_id("B010", "Main"), "B010-Main");
    }

    #[test]
    fn test_period_bounds_are_contiguous() {
        let now = chrono::NaiveDate::from_ymd_opt(2024, 6, 15)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();

        for timeframe in ["day", "week", "month"] {
            let bounds = period_bounds(now, timeframe).unwrap();
            // The previous window ends exactly where the current one starts.
            assert_eq!(bounds.previous_end, bounds.current_start);
            assert!(bounds.previous_start < bounds.previous_end);
            assert!(bounds.current_start < now);
        }

        let week = period_bounds(now, "week").unwrap();
        assert_eq!(now - week.current_start, chrono::Duration::days(7));
        assert_eq!(week.current_start - week.previous_start, chrono::Duration::days(7));

        assert!(period_bounds(now, "fortnight").is_err());
    }

    #[test]
    fn test_refill_trend() {
        assert_eq!(refill_trend(150, 100), Some(50.0));
        assert_eq!(refill_trend(50, 100), Some(-50.0));
        assert_eq!(refill_trend(100, 100), Some(0.0));
        // No baseline, no trend.
        assert_eq!(refill_trend(10, 0), None);
    }

    #[test]
    fn test_activity_detail_action_kinds() {
        assert_eq!(ActivityDetail::Login.action(), "login");
        assert_eq!(
            ActivityDetail::CsvUpload { added: 3, updated: 2 }.action(),
            "csv_upload"
        );
        assert_eq!(
            ActivityDetail::ProductCreated { sku: "X".into() }.action(),
            "input"
        );
        assert_eq!(
            ActivityDetail::Refill {
                box_id: "A001-Main".into(),
                sku: "X".into(),
                quantity: 4
            }
            .action(),
            "refill"
        );
    }

    #[test]
    fn test_activity_detail_serializes_tagged() {
        let detail = ActivityDetail::CsvUpload { added: 3, updated: 2 };
        let value = serde_json::to_value(&detail).unwrap();
        assert_eq!(value["kind"], "csv_upload");
        assert_eq!(value["added"], 3);
        assert_eq!(value["updated"], 2);

        let back: ActivityDetail = serde_json::from_value(value).unwrap();
        assert_eq!(back, detail);
    }

    #[test]
    fn test_activity_detail_sku_reference() {
        assert_eq!(
            ActivityDetail::ProductDeleted { sku: "X".into() }.sku(),
            Some("X")
        );
        assert_eq!(ActivityDetail::Login.sku(), None);
        assert_eq!(
            ActivityDetail::CsvUpload { added: 1, updated: 0 }.sku(),
            None
        );
    }
}

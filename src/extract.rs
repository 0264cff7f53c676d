use scraper::{ElementRef, Html, Selector};

use crate::error::ExtractError;
use crate::record::{source_url, FoodId, RawMeasurement};

fn sel(selector: &str) -> Selector {
    Selector::parse(selector).unwrap()
}

/// Parse one fetched page into raw measurement rows, one per unit variant.
///
/// A page with a recognizable structure but an empty measurement list yields
/// `Ok(vec![])`; `MalformedPage` is reserved for pages where both structural
/// anchors (food heading and measurement select) are missing.
pub fn extract(html: &str, id: FoodId) -> Result<Vec<RawMeasurement>, ExtractError> {
    let doc = Html::parse_document(html);
    let name = food_name(&doc);
    let select = find_select(&doc);

    if name.is_none() && select.is_none() {
        return Err(ExtractError::MalformedPage(
            "no food heading and no measurement select".to_string(),
        ));
    }

    // A missing name is kept as-is for the validator to reject per row.
    let name = name.unwrap_or_default();
    let url = source_url(id);
    let mut rows = Vec::new();

    if let Some(select) = select {
        let option = sel("option");
        for opt in select.select(&option) {
            let attr = |key: &str| opt.value().attr(key).unwrap_or("").to_string();
            rows.push(RawMeasurement {
                food_id: id,
                food_name: name.clone(),
                unit_label: opt.text().collect::<String>().trim().to_string(),
                unit_value: attr("value"),
                calories: attr("data-calories"),
                carbs_g: attr("data-carbs"),
                protein_g: attr("data-protein"),
                fat_g: attr("data-fat"),
                fiber_g: attr("data-fiber"),
                source_url: url.clone(),
            });
        }
    }

    Ok(rows)
}

/// Locate the food name once per page: headings first, page title last.
fn food_name(doc: &Html) -> Option<String> {
    for heading in ["h1", "h2", "h3"] {
        let selector = sel(heading);
        if let Some(el) = doc.select(&selector).next() {
            let text = clean_name(&el.text().collect::<String>());
            if !text.is_empty() {
                return Some(text);
            }
        }
    }

    // Title format: "نام غذا - مانکن"
    let title = sel("title");
    if let Some(el) = doc.select(&title).next() {
        let raw = el.text().collect::<String>();
        let text = clean_name(raw.split('-').next().unwrap_or(""));
        if !text.is_empty() {
            return Some(text);
        }
    }

    None
}

/// The site sometimes mixes nutrient labels and its own name into headings.
fn clean_name(text: &str) -> String {
    let mut name = text.to_string();
    for label in ["کالری:", "قند:", "فیبر:", "نمک:", "مانکن"] {
        name = name.replace(label, "");
    }
    name.trim().to_string()
}

fn find_select(doc: &Html) -> Option<ElementRef<'_>> {
    let measure = sel("select#measure");
    if let Some(el) = doc.select(&measure).next() {
        return Some(el);
    }
    let any = sel("select");
    doc.select(&any).next()
}

#[cfg(test)]
mod tests {
    use super::*;

    const EGG_PAGE: &str = r#"
        <html><head><title>تخم مرغ آب پز - مانکن</title></head><body>
        <h1>تخم مرغ آب پز</h1>
        <select id="measure">
          <option value="100" data-calories="150" data-carbs="20"
                  data-protein="5" data-fat="3" data-fiber="2">100 گرم</option>
          <option value="1" data-calories="300" data-carbs="40"
                  data-protein="10" data-fat="6" data-fiber="4">1 cup</option>
        </select>
        </body></html>"#;

    #[test]
    fn two_measurement_variants() {
        let rows = extract(EGG_PAGE, 5).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].food_name, "تخم مرغ آب پز");
        assert_eq!(rows[0].unit_label, "100 گرم");
        assert_eq!(rows[0].calories, "150");
        assert_eq!(rows[1].unit_label, "1 cup");
        assert_eq!(rows[1].fiber_g, "4");
        assert!(rows.iter().all(|r| r.food_id == 5));
        assert!(rows.iter().all(|r| r.source_url == source_url(5)));
    }

    #[test]
    fn name_falls_back_to_title() {
        let html = r#"
            <html><head><title>سیب - مانکن</title></head><body>
            <select><option value="100" data-calories="52">100 گرم</option></select>
            </body></html>"#;
        let rows = extract(html, 7).unwrap();
        assert_eq!(rows[0].food_name, "سیب");
    }

    #[test]
    fn missing_nutrient_attrs_kept_as_empty_raw_text() {
        let html = r#"
            <html><body><h1>نان</h1>
            <select><option value="100">100 گرم</option></select>
            </body></html>"#;
        let rows = extract(html, 9).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].calories, "");
        assert_eq!(rows[0].fat_g, "");
    }

    #[test]
    fn empty_select_yields_no_rows() {
        let html = "<html><body><h1>آب</h1><select id=\"measure\"></select></body></html>";
        assert!(extract(html, 11).unwrap().is_empty());
    }

    #[test]
    fn heading_without_select_yields_no_rows() {
        let html = "<html><body><h1>چای</h1><p>no table here</p></body></html>";
        assert!(extract(html, 12).unwrap().is_empty());
    }

    #[test]
    fn missing_anchors_is_malformed() {
        let html = "<html><body><p>Warning: something broke</p></body></html>";
        assert!(matches!(
            extract(html, 13),
            Err(ExtractError::MalformedPage(_))
        ));
    }

    #[test]
    fn heading_contamination_stripped() {
        let html = r#"
            <html><body><h1>ماست کالری: فیبر:</h1>
            <select><option value="100" data-calories="60">100 گرم</option></select>
            </body></html>"#;
        let rows = extract(html, 14).unwrap();
        assert_eq!(rows[0].food_name, "ماست");
    }
}

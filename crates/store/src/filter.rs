use campus_contracts::ReportFilter;
use sqlx::{QueryBuilder, Sqlite};

pub(crate) const REPORT_COLUMNS: &str =
    "id, token, category, title, description, location, status, created_at";

pub(crate) const NEWEST_FIRST: &str = " ORDER BY created_at DESC, id DESC";

const LIKE_ESCAPE: char = '\\';

pub(crate) fn filtered_reports_query(
    filter: &ReportFilter,
    limit: u32,
) -> QueryBuilder<'static, Sqlite> {
    let mut builder = QueryBuilder::new(format!(
        "SELECT {} FROM reports WHERE 1=1",
        REPORT_COLUMNS
    ));

    if let Some(category) = filter.category() {
        builder.push(" AND category = ");
        builder.push_bind(category.to_string());
    }

    if let Some(status) = filter.status() {
        builder.push(" AND status = ");
        builder.push_bind(status.to_string());
    }

    if let Some(search) = filter.search() {
        let pattern = like_pattern(search);
        builder.push(" AND (");
        for (idx, column) in ["title", "description", "location"].iter().enumerate() {
            if idx != 0 {
                builder.push(" OR ");
            }
            builder.push(*column);
            builder.push(" LIKE ");
            builder.push_bind(pattern.clone());
            builder.push(" ESCAPE '\\'");
        }
        builder.push(")");
    }

    builder.push(NEWEST_FIRST);
    builder.push(" LIMIT ");
    builder.push_bind(i64::from(limit));
    builder
}

// LIKE wildcards in the term are matched literally.
pub(crate) fn like_pattern(term: &str) -> String {
    let mut out = String::with_capacity(term.len() + 2);
    out.push('%');
    for ch in term.chars() {
        if matches!(ch, '%' | '_') || ch == LIKE_ESCAPE {
            out.push(LIKE_ESCAPE);
        }
        out.push(ch);
    }
    out.push('%');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(category: Option<&str>, status: Option<&str>, search: Option<&str>) -> ReportFilter {
        ReportFilter {
            category: category.map(str::to_string),
            status: status.map(str::to_string),
            search: search.map(str::to_string),
        }
    }

    #[test]
    fn unfiltered_query_only_orders_and_limits() {
        let builder = filtered_reports_query(&ReportFilter::default(), 20);
        assert_eq!(
            builder.sql(),
            "SELECT id, token, category, title, description, location, status, created_at FROM reports WHERE 1=1 ORDER BY created_at DESC, id DESC LIMIT ?"
        );
    }

    #[test]
    fn all_category_adds_no_predicate() {
        let builder = filtered_reports_query(&filter(Some("all"), None, None), 20);
        assert!(!builder.sql().contains("category ="));
    }

    #[test]
    fn filters_are_bound_not_interpolated() {
        let hostile = "x' OR '1'='1";
        let builder =
            filtered_reports_query(&filter(Some(hostile), Some(hostile), Some(hostile)), 20);
        let sql = builder.sql();

        assert!(!sql.contains(hostile));
        assert!(sql.contains(" AND category = ?"));
        assert!(sql.contains(" AND status = ?"));
        assert!(sql.contains(
            " AND (title LIKE ? ESCAPE '\\' OR description LIKE ? ESCAPE '\\' OR location LIKE ? ESCAPE '\\')"
        ));
        assert_eq!(sql.matches('?').count(), 6);
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("light"), "%light%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(like_pattern("a\\b"), "%a\\\\b%");
    }
}

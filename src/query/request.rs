//! Client-facing filter request: where, populates, fields, sort, search, pagination.

use crate::error::AppError;
use crate::query::PopulateRequest;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;

/// Default page size when the request names none.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Filter specification: field -> literal | nested spec | operator expression, plus `$or`.
pub type FilterSpec = Map<String, Value>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        if s.eq_ignore_ascii_case("asc") {
            Some(SortOrder::Asc)
        } else if s.eq_ignore_ascii_case("desc") {
            Some(SortOrder::Desc)
        } else {
            None
        }
    }
}

/// Ordered `field -> direction` mapping; key order of the input is kept.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SortSpec(pub Vec<(String, SortOrder)>);

impl SortSpec {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, SortOrder)> {
        self.0.iter()
    }
}

impl<'de> Deserialize<'de> for SortSpec {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct SortVisitor;

        impl<'de> Visitor<'de> for SortVisitor {
            type Value = SortSpec;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object of field -> \"ASC\" | \"DESC\"")
            }

            fn visit_map<A>(self, mut access: A) -> Result<SortSpec, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut out = Vec::new();
                while let Some((field, dir)) = access.next_entry::<String, String>()? {
                    let order = SortOrder::parse(&dir).ok_or_else(|| {
                        serde::de::Error::custom(format!("invalid sort order '{}' for {}", dir, field))
                    })?;
                    out.push((field, order));
                }
                Ok(SortSpec(out))
            }
        }

        deserializer.deserialize_map(SortVisitor)
    }
}

impl Serialize for SortSpec {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (field, order) in &self.0 {
            map.serialize_entry(field, order.as_sql())?;
        }
        map.end()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchCriteria {
    #[default]
    #[serde(rename = "contains", alias = "Contains")]
    Contains,
    #[serde(rename = "starts-with", alias = "StartWith")]
    StartsWith,
    #[serde(rename = "ends-with", alias = "EndWith")]
    EndsWith,
}

impl SearchCriteria {
    pub fn pattern(self, term: &str) -> String {
        match self {
            SearchCriteria::Contains => format!("%{}%", term),
            SearchCriteria::StartsWith => format!("{}%", term),
            SearchCriteria::EndsWith => format!("%{}", term),
        }
    }
}

/// A requested relation: either its bare name or `{ name, populates }`.
/// Clients can only name relations; join overrides are server-side only.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PopulateItem {
    Name(String),
    Node {
        #[serde(alias = "field", alias = "property")]
        name: String,
        #[serde(default)]
        populates: Vec<PopulateItem>,
    },
}

impl PopulateItem {
    pub fn name(&self) -> &str {
        match self {
            PopulateItem::Name(name) | PopulateItem::Node { name, .. } => name,
        }
    }

    pub fn to_request(&self) -> PopulateRequest {
        match self {
            PopulateItem::Name(name) => PopulateRequest::named(name),
            PopulateItem::Node { name, populates } => PopulateRequest {
                populates: populates.iter().map(PopulateItem::to_request).collect(),
                ..PopulateRequest::named(name)
            },
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterRequest {
    #[serde(default, rename = "where")]
    pub where_: FilterSpec,
    #[serde(default)]
    pub populates: Vec<PopulateItem>,
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub sort: SortSpec,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub search_fields: Vec<String>,
    #[serde(default)]
    pub search_criteria: SearchCriteria,
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub page_size: Option<i64>,
}

impl FilterRequest {
    pub fn with_where(where_: FilterSpec) -> Self {
        FilterRequest {
            where_,
            ..Default::default()
        }
    }

    pub fn populate_requests(&self) -> Vec<PopulateRequest> {
        self.populates.iter().map(PopulateItem::to_request).collect()
    }

    /// Validated page window request. `page >= 1`, `pageSize > 0`.
    pub fn pagination(&self) -> Result<Pagination, AppError> {
        let page = match self.page {
            None => 1,
            Some(p) if p >= 1 => u32::try_from(p)
                .map_err(|_| AppError::BadRequest(format!("page must be <= {}, got {}", u32::MAX, p)))?,
            Some(p) => return Err(AppError::BadRequest(format!("page must be >= 1, got {}", p))),
        };
        let page_size = match self.page_size {
            None => DEFAULT_PAGE_SIZE,
            Some(s) if s > 0 => s.min(u32::MAX as i64) as u32,
            Some(s) => return Err(AppError::BadRequest(format!("pageSize must be > 0, got {}", s))),
        };
        Ok(Pagination { page, page_size })
    }

    pub fn has_window(&self) -> bool {
        self.page.is_some() || self.page_size.is_some()
    }

    /// Build from query-string pairs. `where`, `sort`, `populates` are JSON text;
    /// `fields` and `searchFields` accept JSON arrays or comma-separated names.
    pub fn from_query_params(params: &HashMap<String, String>) -> Result<Self, AppError> {
        let mut req = FilterRequest::default();
        for (k, v) in params {
            match k.as_str() {
                "where" => req.where_ = parse_json_param(k, v)?,
                "populates" => req.populates = parse_json_param(k, v)?,
                "sort" => req.sort = parse_json_param(k, v)?,
                "fields" => req.fields = parse_name_list(k, v)?,
                "searchFields" => req.search_fields = parse_name_list(k, v)?,
                "search" => req.search = Some(v.clone()),
                "searchCriteria" => {
                    req.search_criteria = serde_json::from_value(Value::String(v.clone()))
                        .map_err(|_| AppError::BadRequest(format!("invalid searchCriteria '{}'", v)))?
                }
                "page" => req.page = Some(parse_int_param(k, v)?),
                "pageSize" => req.page_size = Some(parse_int_param(k, v)?),
                _ => {}
            }
        }
        Ok(req)
    }
}

fn parse_json_param<T: for<'de> Deserialize<'de>>(key: &str, raw: &str) -> Result<T, AppError> {
    serde_json::from_str(raw).map_err(|e| AppError::BadRequest(format!("{} must be valid JSON: {}", key, e)))
}

fn parse_name_list(key: &str, raw: &str) -> Result<Vec<String>, AppError> {
    let trimmed = raw.trim();
    if trimmed.starts_with('[') {
        return parse_json_param(key, trimmed);
    }
    Ok(trimmed
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect())
}

fn parse_int_param(key: &str, raw: &str) -> Result<i64, AppError> {
    raw.trim()
        .parse()
        .map_err(|_| AppError::BadRequest(format!("{} must be a number", key)))
}

/// Validated pagination request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
}

impl Pagination {
    /// Clamp page size to `max`. Returns (take, skip).
    pub fn window(&self, max: u32) -> (u32, u64) {
        let take = self.page_size.min(max.max(1));
        let skip = take as u64 * (self.page as u64 - 1);
        (take, skip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sort_spec_keeps_key_order() {
        let sort: SortSpec = serde_json::from_str(r#"{"lastName":"asc","age":"DESC","id":"ASC"}"#).unwrap();
        assert_eq!(
            sort.0,
            vec![
                ("lastName".to_string(), SortOrder::Asc),
                ("age".to_string(), SortOrder::Desc),
                ("id".to_string(), SortOrder::Asc),
            ]
        );
    }

    #[test]
    fn test_sort_spec_rejects_unknown_direction() {
        assert!(serde_json::from_str::<SortSpec>(r#"{"age":"UP"}"#).is_err());
    }

    #[test]
    fn test_populate_item_string_or_object() {
        let items: Vec<PopulateItem> =
            serde_json::from_value(json!(["tags", {"name": "tags", "populates": ["category"]}])).unwrap();
        assert_eq!(items[0], PopulateItem::Name("tags".into()));
        let req = items[1].to_request();
        assert_eq!(req.property, "tags");
        assert_eq!(req.populates.len(), 1);
        assert_eq!(req.populates[0].property, "category");
        assert_eq!(req.eager, None);
    }

    #[test]
    fn test_filter_request_from_body() {
        let req: FilterRequest = serde_json::from_value(json!({
            "where": {"age": {"$gte": 18}},
            "searchFields": ["firstName"],
            "searchCriteria": "starts-with",
            "pageSize": 20
        }))
        .unwrap();
        assert_eq!(req.where_["age"], json!({"$gte": 18}));
        assert_eq!(req.search_criteria, SearchCriteria::StartsWith);
        assert_eq!(req.page_size, Some(20));
    }

    #[test]
    fn test_legacy_search_criteria_names() {
        let c: SearchCriteria = serde_json::from_value(json!("EndWith")).unwrap();
        assert_eq!(c, SearchCriteria::EndsWith);
        assert_eq!(c.pattern("son"), "%son");
        assert_eq!(SearchCriteria::Contains.pattern("an"), "%an%");
    }

    #[test]
    fn test_from_query_params_parses_json_sub_fields() {
        let mut params = HashMap::new();
        params.insert("where".to_string(), r#"{"age":{"$gt":30}}"#.to_string());
        params.insert("sort".to_string(), r#"{"age":"DESC"}"#.to_string());
        params.insert("fields".to_string(), "firstName, lastName".to_string());
        params.insert("searchFields".to_string(), r#"["email"]"#.to_string());
        params.insert("page".to_string(), "2".to_string());
        params.insert("pageSize".to_string(), "20".to_string());
        params.insert("ignored".to_string(), "x".to_string());

        let req = FilterRequest::from_query_params(&params).unwrap();
        assert_eq!(req.where_["age"], json!({"$gt": 30}));
        assert_eq!(req.sort.0, vec![("age".to_string(), SortOrder::Desc)]);
        assert_eq!(req.fields, vec!["firstName", "lastName"]);
        assert_eq!(req.search_fields, vec!["email"]);
        assert_eq!(req.pagination().unwrap(), Pagination { page: 2, page_size: 20 });
    }

    #[test]
    fn test_from_query_params_bad_json_is_bad_request() {
        let mut params = HashMap::new();
        params.insert("where".to_string(), "{not json".to_string());
        let err = FilterRequest::from_query_params(&params).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn test_pagination_validation_and_window() {
        let mut req = FilterRequest::default();
        assert_eq!(req.pagination().unwrap(), Pagination { page: 1, page_size: DEFAULT_PAGE_SIZE });

        req.page = Some(0);
        assert!(req.pagination().is_err());
        req.page = Some(3);
        req.page_size = Some(-5);
        assert!(req.pagination().is_err());

        req.page = Some(4_294_967_297);
        req.page_size = None;
        assert!(matches!(req.pagination(), Err(AppError::BadRequest(_))));
        req.page = Some(u32::MAX as i64);
        assert_eq!(req.pagination().unwrap().page, u32::MAX);

        let p = Pagination { page: 3, page_size: 500 };
        assert_eq!(p.window(100), (100, 200));
        assert_eq!(Pagination { page: 1, page_size: 20 }.window(100), (20, 0));
    }
}

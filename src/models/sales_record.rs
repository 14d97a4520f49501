use crate::errors::ServiceError;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};
use utoipa::ToSchema;
use validator::{Validate, ValidationError, ValidationErrors};

/// Date layouts accepted for the `Date` field, tried in order.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// Value type of an input field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Date,
    Text,
    Decimal,
}

/// The fixed columns of a sales record, in form order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumString,
)]
pub enum SalesField {
    #[strum(serialize = "Date")]
    Date,
    #[strum(serialize = "Product ID")]
    ProductId,
    #[strum(serialize = "Product Name")]
    ProductName,
    #[strum(serialize = "Category")]
    Category,
    #[strum(serialize = "Price")]
    Price,
    #[strum(serialize = "Units Sold")]
    UnitsSold,
    #[strum(serialize = "Units Returned")]
    UnitsReturned,
    #[strum(serialize = "Discount")]
    Discount,
    #[strum(serialize = "Location")]
    Location,
    #[strum(serialize = "Platform")]
    Platform,
    #[strum(serialize = "Marketing Spend")]
    MarketingSpend,
    #[strum(serialize = "Promotions")]
    Promotions,
}

impl SalesField {
    /// Column header used in forms and CSV files
    pub fn column(self) -> &'static str {
        match self {
            Self::Date => "Date",
            Self::ProductId => "Product ID",
            Self::ProductName => "Product Name",
            Self::Category => "Category",
            Self::Price => "Price",
            Self::UnitsSold => "Units Sold",
            Self::UnitsReturned => "Units Returned",
            Self::Discount => "Discount",
            Self::Location => "Location",
            Self::Platform => "Platform",
            Self::MarketingSpend => "Marketing Spend",
            Self::Promotions => "Promotions",
        }
    }

    /// snake_case alias, identical to the struct attribute name
    pub fn alias(self) -> &'static str {
        match self {
            Self::Date => "date",
            Self::ProductId => "product_id",
            Self::ProductName => "product_name",
            Self::Category => "category",
            Self::Price => "price",
            Self::UnitsSold => "units_sold",
            Self::UnitsReturned => "units_returned",
            Self::Discount => "discount",
            Self::Location => "location",
            Self::Platform => "platform",
            Self::MarketingSpend => "marketing_spend",
            Self::Promotions => "promotions",
        }
    }

    pub fn kind(self) -> FieldKind {
        match self {
            Self::Date => FieldKind::Date,
            Self::ProductId
            | Self::ProductName
            | Self::Category
            | Self::Location
            | Self::Platform => FieldKind::Text,
            Self::Price
            | Self::UnitsSold
            | Self::UnitsReturned
            | Self::Discount
            | Self::MarketingSpend
            | Self::Promotions => FieldKind::Decimal,
        }
    }

    /// Resolves a column header or snake_case alias
    pub fn lookup(name: &str) -> Option<Self> {
        Self::from_str(name)
            .ok()
            .or_else(|| Self::iter().find(|field| field.alias() == name))
    }
}

/// One entry of the published input schema
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FieldSpec {
    pub name: &'static str,
    pub alias: &'static str,
    pub kind: FieldKind,
    pub constraint: &'static str,
}

/// Field schema, in form order
pub fn field_schema() -> Vec<FieldSpec> {
    SalesField::iter()
        .map(|field| FieldSpec {
            name: field.column(),
            alias: field.alias(),
            kind: field.kind(),
            constraint: match field.kind() {
                FieldKind::Date => "required, parseable as date",
                FieldKind::Text => "required, non-empty",
                FieldKind::Decimal => "required, decimal >= 0",
            },
        })
        .collect()
}

/// Anything a record can be read from: a JSON form, a CSV row, CLI flags.
pub trait FieldSource {
    /// Raw value stored under `name`, if any
    fn lookup(&self, name: &str) -> Option<Cow<'_, str>>;

    /// Raw value for `field` under its column name or its alias.
    /// Blank values count as missing.
    fn field(&self, field: SalesField) -> Option<Cow<'_, str>> {
        self.lookup(field.column())
            .or_else(|| self.lookup(field.alias()))
            .filter(|value| !value.trim().is_empty())
    }
}

impl<T: FieldSource + ?Sized> FieldSource for &T {
    fn lookup(&self, name: &str) -> Option<Cow<'_, str>> {
        (**self).lookup(name)
    }
}

impl FieldSource for Map<String, Value> {
    fn lookup(&self, name: &str) -> Option<Cow<'_, str>> {
        match self.get(name)? {
            Value::Null => None,
            Value::String(s) => Some(Cow::Borrowed(s.as_str())),
            Value::Number(n) => Some(Cow::Owned(n.to_string())),
            other => Some(Cow::Owned(other.to_string())),
        }
    }
}

impl FieldSource for BTreeMap<String, String> {
    fn lookup(&self, name: &str) -> Option<Cow<'_, str>> {
        self.get(name).map(|s| Cow::Borrowed(s.as_str()))
    }
}

impl FieldSource for HashMap<String, String> {
    fn lookup(&self, name: &str) -> Option<Cow<'_, str>> {
        self.get(name).map(|s| Cow::Borrowed(s.as_str()))
    }
}

/// Borrowed view of a single field value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue<'a> {
    Date(NaiveDate),
    Text(&'a str),
    Decimal(Decimal),
}

/// One validated sales record
#[derive(Debug, Clone, PartialEq, Serialize, Validate, ToSchema)]
pub struct SalesRecord {
    #[serde(rename = "Date", alias = "date")]
    #[schema(example = "2024-01-01")]
    pub date: NaiveDate,

    #[serde(rename = "Product ID", alias = "product_id")]
    #[validate(length(min = 1))]
    pub product_id: String,

    #[serde(rename = "Product Name", alias = "product_name")]
    #[validate(length(min = 1))]
    pub product_name: String,

    #[serde(rename = "Category", alias = "category")]
    #[validate(length(min = 1))]
    pub category: String,

    #[serde(rename = "Price", alias = "price")]
    #[validate(custom = "validate_non_negative")]
    pub price: Decimal,

    #[serde(rename = "Units Sold", alias = "units_sold")]
    #[validate(custom = "validate_non_negative")]
    pub units_sold: Decimal,

    #[serde(rename = "Units Returned", alias = "units_returned")]
    #[validate(custom = "validate_non_negative")]
    pub units_returned: Decimal,

    #[serde(rename = "Discount", alias = "discount")]
    #[validate(custom = "validate_non_negative")]
    pub discount: Decimal,

    #[serde(rename = "Location", alias = "location")]
    #[validate(length(min = 1))]
    pub location: String,

    #[serde(rename = "Platform", alias = "platform")]
    #[validate(length(min = 1))]
    pub platform: String,

    #[serde(rename = "Marketing Spend", alias = "marketing_spend")]
    #[validate(custom = "validate_non_negative")]
    pub marketing_spend: Decimal,

    #[serde(rename = "Promotions", alias = "promotions")]
    #[validate(custom = "validate_non_negative")]
    pub promotions: Decimal,
}

impl SalesRecord {
    /// Reads and validates every field from `source`.
    ///
    /// Fails with [`ServiceError::TransformError`] naming the first missing or
    /// malformed field, or listing every constraint violation.
    pub fn from_source<S: FieldSource + ?Sized>(source: &S) -> Result<Self, ServiceError> {
        let record = Self {
            date: date_field(source, SalesField::Date)?,
            product_id: text_field(source, SalesField::ProductId)?,
            product_name: text_field(source, SalesField::ProductName)?,
            category: text_field(source, SalesField::Category)?,
            price: decimal_field(source, SalesField::Price)?,
            units_sold: decimal_field(source, SalesField::UnitsSold)?,
            units_returned: decimal_field(source, SalesField::UnitsReturned)?,
            discount: decimal_field(source, SalesField::Discount)?,
            location: text_field(source, SalesField::Location)?,
            platform: text_field(source, SalesField::Platform)?,
            marketing_spend: decimal_field(source, SalesField::MarketingSpend)?,
            promotions: decimal_field(source, SalesField::Promotions)?,
        };

        record
            .validate()
            .map_err(|errors| ServiceError::TransformError(describe_violations(&errors)))?;

        Ok(record)
    }

    /// Parses every source or none of them.
    ///
    /// A single bad row is reported as is, prefixed with its 1-based position;
    /// several bad rows are summarized as `"{failed} of {total} rows failed; row N: ..."`.
    pub fn parse_all<I>(sources: I) -> Result<Vec<Self>, ServiceError>
    where
        I: IntoIterator,
        I::Item: FieldSource,
    {
        let mut records = Vec::new();
        let mut first_error: Option<ServiceError> = None;
        let mut failed = 0usize;
        let mut total = 0usize;

        for (idx, source) in sources.into_iter().enumerate() {
            total += 1;
            match Self::from_source(&source) {
                Ok(record) => records.push(record),
                Err(err) => {
                    failed += 1;
                    if first_error.is_none() {
                        first_error = Some(err.at_row(idx + 1));
                    }
                }
            }
        }

        match first_error {
            None => Ok(records),
            Some(err) if failed == 1 => Err(err),
            Some(ServiceError::TransformError(msg)) => Err(ServiceError::TransformError(format!(
                "{} of {} rows failed; {}",
                failed, total, msg
            ))),
            Some(other) => Err(other),
        }
    }

    pub fn value(&self, field: SalesField) -> FieldValue<'_> {
        match field {
            SalesField::Date => FieldValue::Date(self.date),
            SalesField::ProductId => FieldValue::Text(&self.product_id),
            SalesField::ProductName => FieldValue::Text(&self.product_name),
            SalesField::Category => FieldValue::Text(&self.category),
            SalesField::Price => FieldValue::Decimal(self.price),
            SalesField::UnitsSold => FieldValue::Decimal(self.units_sold),
            SalesField::UnitsReturned => FieldValue::Decimal(self.units_returned),
            SalesField::Discount => FieldValue::Decimal(self.discount),
            SalesField::Location => FieldValue::Text(&self.location),
            SalesField::Platform => FieldValue::Text(&self.platform),
            SalesField::MarketingSpend => FieldValue::Decimal(self.marketing_spend),
            SalesField::Promotions => FieldValue::Decimal(self.promotions),
        }
    }
}

fn require<'a, S: FieldSource + ?Sized>(
    source: &'a S,
    field: SalesField,
) -> Result<Cow<'a, str>, ServiceError> {
    source.field(field).ok_or_else(|| {
        ServiceError::TransformError(format!("missing required field '{}'", field.column()))
    })
}

fn text_field<S: FieldSource + ?Sized>(
    source: &S,
    field: SalesField,
) -> Result<String, ServiceError> {
    Ok(require(source, field)?.trim().to_string())
}

fn decimal_field<S: FieldSource + ?Sized>(
    source: &S,
    field: SalesField,
) -> Result<Decimal, ServiceError> {
    let raw = require(source, field)?;
    parse_decimal(&raw).ok_or_else(|| {
        ServiceError::TransformError(format!(
            "field '{}' is not a valid decimal: '{}'",
            field.column(),
            raw.trim()
        ))
    })
}

fn date_field<S: FieldSource + ?Sized>(
    source: &S,
    field: SalesField,
) -> Result<NaiveDate, ServiceError> {
    let raw = require(source, field)?;
    parse_date(&raw).ok_or_else(|| {
        ServiceError::TransformError(format!(
            "field '{}' is not a valid date: '{}'",
            field.column(),
            raw.trim()
        ))
    })
}

/// Parses plain and scientific decimal notation
pub fn parse_decimal(raw: &str) -> Option<Decimal> {
    let trimmed = raw.trim();
    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .ok()
}

/// Parses a calendar date, discarding any time of day
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();

    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
                .map(|dt| dt.date())
        })
        .or_else(|| {
            DateTime::parse_from_rfc3339(trimmed)
                .ok()
                .map(|dt| dt.date_naive())
        })
}

fn validate_non_negative(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() && !value.is_zero() {
        let mut err = ValidationError::new("non_negative");
        err.message = Some("must be greater than or equal to 0".into());
        return Err(err);
    }
    Ok(())
}

fn describe_violations(errors: &ValidationErrors) -> String {
    let mut messages: Vec<String> = errors
        .field_errors()
        .into_iter()
        .map(|(attribute, errs)| {
            let column = SalesField::lookup(attribute)
                .map(SalesField::column)
                .unwrap_or(attribute);
            let reason = errs
                .iter()
                .find_map(|e| e.message.as_ref().map(|m| m.to_string()))
                .unwrap_or_else(|| "must not be empty".to_string());
            format!("field '{}' {}", column, reason)
        })
        .collect();
    messages.sort();
    messages.join("; ")
}

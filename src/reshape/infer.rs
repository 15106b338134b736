//! Heuristic column-role inference.
//!
//! Each role owns a ranked list of predicates over a column's name and a
//! sample of its values. The first rank with at least one matching column
//! wins; if several columns match that rank, its tie rule either takes the
//! leftmost one or rejects the table as ambiguous. The result is a typed
//! `Option<ColumnMatch>`, never a guess.

use std::{fmt, ops::RangeInclusive};

use crate::country::normalize::looks_like_iso3;
use crate::error::InferenceError;
use crate::table::RawTable;

/// Rows sampled per column.
pub const SAMPLE_LIMIT: usize = 1_000;

/// Years accepted as plausible observation periods.
pub const YEAR_RANGE: RangeInclusive<i32> = 1950..=2100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Country,
    Iso3,
    Year,
    Value,
    Indicator,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Country => "country",
            Role::Iso3 => "iso3",
            Role::Year => "year",
            Role::Value => "value",
            Role::Indicator => "indicator",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TieBreak {
    Leftmost,
    Reject,
}

/// Name and sampled values of one column.
#[derive(Debug, Clone)]
pub struct ColumnProfile<'a> {
    pub index: usize,
    pub name: &'a str,
    /// Lowercased, `_`/`-` turned into spaces, whitespace collapsed.
    pub folded: String,
    pub samples: Vec<&'a str>,
}

impl<'a> ColumnProfile<'a> {
    pub fn new(index: usize, name: &'a str, samples: Vec<&'a str>) -> Self {
        Self {
            index,
            name,
            folded: fold_header(name),
            samples,
        }
    }

    /// Folded name without any whitespace ("PM 2.5" -> "pm2.5").
    pub fn compact(&self) -> String {
        self.folded.split_whitespace().collect()
    }

    /// Every non-missing sample is a plausible year (and there is at least one).
    pub fn all_years(&self) -> bool {
        let mut present = self.samples.iter().filter(|s| !is_missing_marker(s)).peekable();
        present.peek().is_some() && present.all(|s| parse_year(s).is_some())
    }

    pub fn any_text(&self) -> bool {
        self.samples.iter().any(|s| s.parse::<f64>().is_err())
    }

    pub fn all_iso3(&self) -> bool {
        !self.samples.is_empty() && self.samples.iter().all(|s| looks_like_iso3(s))
    }
}

const MISSING_MARKERS: &[&str] = &["", "..", "na", "n/a", "nan", "null", "-", "no data"];

/// Cell text that stands for "no observation".
pub fn is_missing_marker(s: &str) -> bool {
    MISSING_MARKERS.contains(&s.trim().to_ascii_lowercase().as_str())
}

pub fn fold_header(name: &str) -> String {
    name.to_lowercase()
        .replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Integer (or integral float such as `2020.0`) inside `YEAR_RANGE`.
pub fn parse_year(s: &str) -> Option<i32> {
    let s = s.trim();
    let year = match s.parse::<i32>() {
        Ok(y) => y,
        Err(_) => {
            let f = s.parse::<f64>().ok()?;
            if f.fract() != 0.0 || !f.is_finite() {
                return None;
            }
            f as i32
        }
    };
    YEAR_RANGE.contains(&year).then_some(year)
}

/// Profile every column of `table`.
pub fn profile(table: &RawTable) -> Vec<ColumnProfile<'_>> {
    table
        .headers
        .iter()
        .enumerate()
        .map(|(i, h)| ColumnProfile::new(i, h, table.sample(i, SAMPLE_LIMIT)))
        .collect()
}

type Test<'a> = Box<dyn Fn(&ColumnProfile<'_>) -> bool + 'a>;

pub struct Predicate<'a> {
    pub rule: &'static str,
    pub tie: TieBreak,
    test: Test<'a>,
}

impl<'a> Predicate<'a> {
    pub fn new(
        rule: &'static str,
        tie: TieBreak,
        test: impl Fn(&ColumnProfile<'_>) -> bool + 'a,
    ) -> Self {
        Self {
            rule,
            tie,
            test: Box::new(test),
        }
    }

    pub fn matches(&self, col: &ColumnProfile<'_>) -> bool {
        (self.test)(col)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMatch {
    pub index: usize,
    pub name: String,
    /// Rule that selected the column, `explicit` for configured columns.
    pub rule: &'static str,
}

fn name_in(names: &'static [&'static str]) -> impl Fn(&ColumnProfile<'_>) -> bool {
    move |c: &ColumnProfile<'_>| names.contains(&c.folded.as_str())
}

pub fn year_predicates() -> Vec<Predicate<'static>> {
    vec![
        Predicate::new("name is `year`", TieBreak::Reject, |c| c.folded == "year"),
        Predicate::new("year-like name with year values", TieBreak::Reject, |c| {
            ["year", "period", "date", "time"]
                .iter()
                .any(|k| c.folded.contains(k))
                && c.all_years()
        }),
        Predicate::new("all values are plausible years", TieBreak::Reject, |c| {
            c.all_years()
        }),
    ]
}

pub fn country_predicates() -> Vec<Predicate<'static>> {
    vec![
        Predicate::new("name is `country`", TieBreak::Reject, |c| c.folded == "country"),
        Predicate::new(
            "country-like name",
            TieBreak::Reject,
            name_in(&[
                "country name",
                "countries",
                "country or area",
                "location",
                "area",
                "entity",
                "countries, territories and areas",
            ]),
        ),
        Predicate::new("leftmost text column", TieBreak::Leftmost, |c| c.any_text()),
    ]
}

pub fn iso3_predicates() -> Vec<Predicate<'static>> {
    vec![Predicate::new(
        "code-like name with ISO3 values",
        TieBreak::Reject,
        |c| {
            [
                "iso3",
                "iso3 code",
                "iso 3",
                "countryiso3code",
                "country code",
                "spatialdimvaluecode",
                "code",
            ]
            .contains(&c.folded.as_str())
                && c.all_iso3()
        },
    )]
}

pub fn indicator_predicates() -> Vec<Predicate<'static>> {
    vec![
        Predicate::new(
            "indicator code name",
            TieBreak::Reject,
            name_in(&["indicator", "indicator code", "indicator id", "series code"]),
        ),
        Predicate::new(
            "indicator label name",
            TieBreak::Reject,
            name_in(&["indicator name", "series name", "series"]),
        ),
    ]
}

/// Value column predicates: exact indicator name, then all `keywords`
/// contained in the compacted header, then generic value headers.
pub fn value_predicates<'a>(
    indicator: Option<&'a str>,
    keywords: &'a [String],
) -> Vec<Predicate<'a>> {
    let mut preds = Vec::with_capacity(3);
    if let Some(ind) = indicator {
        let target = fold_header(ind);
        preds.push(Predicate::new(
            "name is the indicator",
            TieBreak::Reject,
            move |c: &ColumnProfile<'_>| c.folded == target,
        ));
    }
    if !keywords.is_empty() {
        preds.push(Predicate::new(
            "name contains every keyword",
            TieBreak::Reject,
            move |c: &ColumnProfile<'_>| {
                let compact = c.compact();
                keywords
                    .iter()
                    .all(|k| compact.contains(&fold_header(k).replace(' ', "")))
            },
        ));
    }
    preds.push(Predicate::new(
        "generic value name",
        TieBreak::Reject,
        name_in(&["value", "factvaluenumeric", "numeric value", "obs value"]),
    ));
    preds
}

/// Run `preds` in rank order over `columns`, skipping indices in `exclude`.
pub fn infer_column(
    role: Role,
    columns: &[ColumnProfile<'_>],
    preds: &[Predicate<'_>],
    exclude: &[usize],
) -> Result<Option<ColumnMatch>, InferenceError> {
    for pred in preds {
        let hits: Vec<&ColumnProfile<'_>> = columns
            .iter()
            .filter(|c| !exclude.contains(&c.index))
            .filter(|c| pred.matches(c))
            .collect();

        match (hits.as_slice(), pred.tie) {
            ([], _) => continue,
            ([only], _) | ([only, ..], TieBreak::Leftmost) => {
                return Ok(Some(ColumnMatch {
                    index: only.index,
                    name: only.name.to_string(),
                    rule: pred.rule,
                }))
            }
            (many, TieBreak::Reject) => {
                return Err(InferenceError::Ambiguous {
                    role: role.to_string(),
                    rule: pred.rule.to_string(),
                    candidates: many.iter().map(|c| c.name.to_string()).collect(),
                })
            }
        }
    }
    Ok(None)
}

/// Like [`infer_column`] but a missing column is an error.
pub fn require_column(
    role: Role,
    columns: &[ColumnProfile<'_>],
    preds: &[Predicate<'_>],
    exclude: &[usize],
) -> Result<ColumnMatch, InferenceError> {
    infer_column(role, columns, preds, exclude)?.ok_or_else(|| InferenceError::Missing {
        role: role.to_string(),
        columns: columns
            .iter()
            .filter(|c| !exclude.contains(&c.index))
            .map(|c| c.name)
            .collect::<Vec<_>>()
            .join(", "),
    })
}

/// Resolve a configured column name against the table.
pub fn explicit_column(
    role: Role,
    table: &RawTable,
    name: &str,
) -> Result<ColumnMatch, InferenceError> {
    table
        .column_index(name)
        .map(|index| ColumnMatch {
            index,
            name: name.to_string(),
            rule: "explicit",
        })
        .ok_or_else(|| InferenceError::NotPresent {
            role: role.to_string(),
            column: name.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols<'a>(spec: &'a [(&'a str, &'a [&'a str])]) -> Vec<ColumnProfile<'a>> {
        spec.iter()
            .enumerate()
            .map(|(i, (name, samples))| ColumnProfile::new(i, name, samples.to_vec()))
            .collect()
    }

    #[test]
    fn year_prefers_named_column_over_value_shape() {
        let profile = cols(&[
            ("Period", &["2019", "2020"]),
            ("Year", &["2019", "2020"]),
            ("Value", &["12.3", "14.1"]),
        ]);
        let m = infer_column(Role::Year, &profile, &year_predicates(), &[])
            .unwrap()
            .unwrap();
        assert_eq!(m.name, "Year");
        assert_eq!(m.rule, "name is `year`");
    }

    #[test]
    fn year_falls_back_to_value_range() {
        let profile = cols(&[("Location", &["Germany"]), ("Dim1", &["2020", "2020.0"])]);
        let m = infer_column(Role::Year, &profile, &year_predicates(), &[])
            .unwrap()
            .unwrap();
        assert_eq!(m.index, 1);
        assert_eq!(m.rule, "all values are plausible years");
    }

    #[test]
    fn out_of_range_integers_are_not_years() {
        let profile = cols(&[("Count", &["12", "1500"]), ("Label", &["x"])]);
        assert_eq!(
            infer_column(Role::Year, &profile, &year_predicates(), &[]).unwrap(),
            None
        );
    }

    #[test]
    fn ambiguous_year_columns_are_reported() {
        let profile = cols(&[("A", &["2000"]), ("B", &["2001"])]);
        let err = infer_column(Role::Year, &profile, &year_predicates(), &[]).unwrap_err();
        assert!(matches!(err, InferenceError::Ambiguous { ref candidates, .. } if candidates.len() == 2));
    }

    #[test]
    fn value_keyword_match_ignores_spaces_and_case() {
        let keywords = vec!["pm".to_string(), "2.5".to_string()];
        let profile = cols(&[
            ("Country", &["Germany"]),
            ("Concentrations of fine particulate matter (PM 2.5)", &["12.3"]),
            ("Value", &["1"]),
        ]);
        let m = infer_column(
            Role::Value,
            &profile,
            &value_predicates(Some("pm25"), &keywords),
            &[],
        )
        .unwrap()
        .unwrap();
        assert_eq!(m.index, 1);
        assert_eq!(m.rule, "name contains every keyword");
    }

    #[test]
    fn country_takes_leftmost_text_column_excluding_assigned() {
        let profile = cols(&[
            ("Code", &["DEU"]),
            ("Nation", &["Germany"]),
            ("Region", &["Europe"]),
            ("Year", &["2020"]),
        ]);
        let iso = infer_column(Role::Iso3, &profile, &iso3_predicates(), &[])
            .unwrap()
            .unwrap();
        assert_eq!(iso.index, 0);
        let m = infer_column(Role::Country, &profile, &country_predicates(), &[iso.index])
            .unwrap()
            .unwrap();
        assert_eq!(m.name, "Nation");
    }

    #[test]
    fn same_profile_always_picks_same_columns() {
        let profile = cols(&[("Location", &["Germany"]), ("Country_Name", &["Germany"])]);
        let first = infer_column(Role::Country, &profile, &country_predicates(), &[]);
        for _ in 0..10 {
            assert_eq!(
                infer_column(Role::Country, &profile, &country_predicates(), &[]),
                first
            );
        }
        assert!(first.is_err());
    }

    #[test]
    fn missing_required_column_lists_candidates() {
        let profile = cols(&[("a", &["1"]), ("b", &["2"])]);
        let err = require_column(Role::Indicator, &profile, &indicator_predicates(), &[])
            .unwrap_err();
        assert_eq!(
            err,
            InferenceError::Missing {
                role: "indicator".into(),
                columns: "a, b".into()
            }
        );
    }

    #[test]
    fn parse_year_accepts_integral_floats_only() {
        assert_eq!(parse_year("2020"), Some(2020));
        assert_eq!(parse_year(" 2020.0 "), Some(2020));
        assert_eq!(parse_year("2020.5"), None);
        assert_eq!(parse_year("1900"), None);
        assert_eq!(parse_year("abc"), None);
    }
}

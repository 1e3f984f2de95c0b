/// Code generation for the current view configuration
///
/// Renders the active row filters and sort keys as a short sequence of
/// source statements in a target dataframe dialect, so a user can
/// reproduce the on-screen view in a notebook. Purely textual; nothing
/// here is executed.

use crate::column::DisplayType;
use crate::filter::{CompareFilterOp, FilterCondition, FilterKind, RowFilter, SearchType};
use crate::sort::ColumnSortKey;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeSyntax {
    Pandas,
    Polars,
}

impl CodeSyntax {
    pub fn from_name(name: &str) -> Result<Self, String> {
        match name {
            "pandas" => Ok(CodeSyntax::Pandas),
            "polars" => Ok(CodeSyntax::Polars),
            other => Err(format!("unsupported code syntax '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvertedCode {
    pub converted_code: Vec<String>,
}

/// Quote a filter literal per the column's display type. Numbers and
/// booleans pass through bare, everything else is single-quoted.
fn literal(value: &str, type_display: DisplayType) -> String {
    match type_display {
        DisplayType::Number => value.to_string(),
        DisplayType::Boolean => {
            if value.eq_ignore_ascii_case("true") {
                "True".to_string()
            } else {
                "False".to_string()
            }
        }
        _ => format!("'{}'", value.replace('\'', "\\'")),
    }
}

fn py_str(s: &str) -> String {
    format!("'{}'", s.replace('\'', "\\'"))
}

fn compare_op_text(op: CompareFilterOp) -> &'static str {
    match op {
        CompareFilterOp::Eq => "==",
        CompareFilterOp::NotEq => "!=",
        CompareFilterOp::Lt => "<",
        CompareFilterOp::LtEq => "<=",
        CompareFilterOp::Gt => ">",
        CompareFilterOp::GtEq => ">=",
    }
}

fn pandas_expr(filter: &RowFilter) -> String {
    let col = format!("df[{}]", py_str(&filter.column_schema.column_name));
    let display = filter.column_schema.type_display;
    match &filter.kind {
        FilterKind::Compare { op, value } => {
            format!("({} {} {})", col, compare_op_text(*op), literal(value, display))
        }
        FilterKind::Between {
            left_value,
            right_value,
        } => format!(
            "({}.between({}, {}))",
            col,
            literal(left_value, display),
            literal(right_value, display)
        ),
        FilterKind::NotBetween {
            left_value,
            right_value,
        } => format!(
            "(~{}.between({}, {}))",
            col,
            literal(left_value, display),
            literal(right_value, display)
        ),
        FilterKind::IsNull => format!("({}.isnull())", col),
        FilterKind::NotNull => format!("({}.notnull())", col),
        FilterKind::IsTrue => format!("({} == True)", col),
        FilterKind::IsFalse => format!("({} == False)", col),
        FilterKind::IsEmpty => format!("({}.str.len() == 0)", col),
        FilterKind::NotEmpty => format!("({}.str.len() != 0)", col),
        FilterKind::SetMembership { values, inclusive } => {
            let items: Vec<String> = values.iter().map(|v| literal(v, display)).collect();
            if *inclusive {
                format!("({}.isin([{}]))", col, items.join(", "))
            } else {
                format!("(~{}.isin([{}]))", col, items.join(", "))
            }
        }
        FilterKind::Search {
            search_type,
            term,
            case_sensitive,
        } => {
            let term = py_str(term);
            let case = if *case_sensitive { "True" } else { "False" };
            match search_type {
                SearchType::Contains => {
                    format!("({}.str.contains({}, case={}, regex=False))", col, term, case)
                }
                SearchType::NotContains => {
                    format!("(~{}.str.contains({}, case={}, regex=False))", col, term, case)
                }
                SearchType::StartsWith => format!("({}.str.startswith({}))", col, term),
                SearchType::EndsWith => format!("({}.str.endswith({}))", col, term),
                SearchType::RegexMatch => {
                    format!("({}.str.contains({}, case={}, regex=True))", col, term, case)
                }
            }
        }
    }
}

fn polars_expr(filter: &RowFilter) -> String {
    let col = format!("pl.col({})", py_str(&filter.column_schema.column_name));
    let display = filter.column_schema.type_display;
    match &filter.kind {
        FilterKind::Compare { op, value } => {
            format!("({} {} {})", col, compare_op_text(*op), literal(value, display))
        }
        FilterKind::Between {
            left_value,
            right_value,
        } => format!(
            "({}.is_between({}, {}))",
            col,
            literal(left_value, display),
            literal(right_value, display)
        ),
        FilterKind::NotBetween {
            left_value,
            right_value,
        } => format!(
            "(~{}.is_between({}, {}))",
            col,
            literal(left_value, display),
            literal(right_value, display)
        ),
        FilterKind::IsNull => format!("({}.is_null())", col),
        FilterKind::NotNull => format!("({}.is_not_null())", col),
        FilterKind::IsTrue => format!("({} == True)", col),
        FilterKind::IsFalse => format!("({} == False)", col),
        FilterKind::IsEmpty => format!("({}.str.len_chars() == 0)", col),
        FilterKind::NotEmpty => format!("({}.str.len_chars() != 0)", col),
        FilterKind::SetMembership { values, inclusive } => {
            let items: Vec<String> = values.iter().map(|v| literal(v, display)).collect();
            if *inclusive {
                format!("({}.is_in([{}]))", col, items.join(", "))
            } else {
                format!("(~{}.is_in([{}]))", col, items.join(", "))
            }
        }
        FilterKind::Search {
            search_type,
            term,
            case_sensitive,
        } => {
            let raw = py_str(term);
            match search_type {
                SearchType::Contains | SearchType::NotContains => {
                    let pattern = if *case_sensitive {
                        format!("{}, literal=True", raw)
                    } else {
                        py_str(&format!("(?i){}", regex_escaped(term)))
                    };
                    let expr = format!("{}.str.contains({})", col, pattern);
                    if matches!(search_type, SearchType::NotContains) {
                        format!("(~{})", expr)
                    } else {
                        format!("({})", expr)
                    }
                }
                SearchType::StartsWith => format!("({}.str.starts_with({}))", col, raw),
                SearchType::EndsWith => format!("({}.str.ends_with({}))", col, raw),
                SearchType::RegexMatch => {
                    let pattern = if *case_sensitive {
                        raw
                    } else {
                        py_str(&format!("(?i){}", term))
                    };
                    format!("({}.str.contains({}))", col, pattern)
                }
            }
        }
    }
}

fn regex_escaped(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for c in term.chars() {
        if "\\.+*?()|[]{}^$#&-~".contains(c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Fold valid filter expressions left to right with each filter's own
/// and/or condition.
fn combine_expressions(filters: &[RowFilter], render: fn(&RowFilter) -> String) -> Option<String> {
    let mut combined: Option<String> = None;
    for filter in filters.iter().filter(|f| f.is_valid) {
        let expr = render(filter);
        combined = Some(match combined {
            None => expr,
            Some(acc) => {
                let op = match filter.condition {
                    FilterCondition::And => "&",
                    FilterCondition::Or => "|",
                };
                format!("{} {} {}", acc, op, expr)
            }
        });
    }
    combined
}

/// Render the filter/sort specification as executable statements in the
/// requested dialect.
pub fn convert_to_code(
    row_filters: &[RowFilter],
    sort_keys: &[ColumnSortKey],
    column_names: &[String],
    syntax: CodeSyntax,
) -> ConvertedCode {
    let mut lines = Vec::new();
    match syntax {
        CodeSyntax::Pandas => {
            let mut frame = "df".to_string();
            if let Some(expr) = combine_expressions(row_filters, pandas_expr) {
                lines.push(format!("mask = {}", expr));
                lines.push("filtered = df[mask]".to_string());
                frame = "filtered".to_string();
            }
            if !sort_keys.is_empty() {
                let (names, directions) = sort_args(sort_keys, column_names);
                lines.push(format!(
                    "{} = {}.sort_values(by=[{}], ascending=[{}])",
                    frame,
                    frame,
                    names.join(", "),
                    directions
                        .iter()
                        .map(|asc| if *asc { "True" } else { "False" })
                        .collect::<Vec<_>>()
                        .join(", ")
                ));
            }
        }
        CodeSyntax::Polars => {
            let mut frame = "df".to_string();
            if let Some(expr) = combine_expressions(row_filters, polars_expr) {
                lines.push(format!("filtered = df.filter({})", expr));
                frame = "filtered".to_string();
            }
            if !sort_keys.is_empty() {
                let (names, directions) = sort_args(sort_keys, column_names);
                lines.push(format!(
                    "{} = {}.sort([{}], descending=[{}])",
                    frame,
                    frame,
                    names.join(", "),
                    directions
                        .iter()
                        .map(|asc| if *asc { "False" } else { "True" })
                        .collect::<Vec<_>>()
                        .join(", ")
                ));
            }
        }
    }
    ConvertedCode {
        converted_code: lines,
    }
}

fn sort_args(sort_keys: &[ColumnSortKey], column_names: &[String]) -> (Vec<String>, Vec<bool>) {
    let mut names = Vec::new();
    let mut ascending = Vec::new();
    for key in sort_keys {
        if let Some(name) = column_names.get(key.column_index) {
            names.push(py_str(name));
            ascending.push(key.ascending);
        }
    }
    (names, ascending)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnSchema;

    fn schema(name: &str, display: DisplayType) -> ColumnSchema {
        ColumnSchema {
            column_name: name.to_string(),
            column_index: 0,
            type_name: "int64".to_string(),
            type_display: display,
            timezone: None,
        }
    }

    fn compare_filter(name: &str, op: CompareFilterOp, value: &str) -> RowFilter {
        RowFilter {
            filter_id: "f".to_string(),
            condition: FilterCondition::And,
            column_schema: schema(name, DisplayType::Number),
            kind: FilterKind::Compare {
                op,
                value: value.to_string(),
            },
            is_valid: true,
            error_message: None,
        }
    }

    #[test]
    fn test_pandas_filter_and_sort() {
        let filters = vec![compare_filter("a", CompareFilterOp::Gt, "2")];
        let keys = vec![ColumnSortKey {
            column_index: 0,
            ascending: false,
        }];
        let code = convert_to_code(&filters, &keys, &["a".to_string()], CodeSyntax::Pandas);
        assert_eq!(
            code.converted_code,
            vec![
                "mask = (df['a'] > 2)".to_string(),
                "filtered = df[mask]".to_string(),
                "filtered = filtered.sort_values(by=['a'], ascending=[False])".to_string(),
            ]
        );
    }

    #[test]
    fn test_polars_filter() {
        let filters = vec![compare_filter("a", CompareFilterOp::LtEq, "10")];
        let code = convert_to_code(&filters, &[], &["a".to_string()], CodeSyntax::Polars);
        assert_eq!(
            code.converted_code,
            vec!["filtered = df.filter((pl.col('a') <= 10))".to_string()]
        );
    }

    #[test]
    fn test_string_literals_are_quoted() {
        let mut filter = compare_filter("name", CompareFilterOp::Eq, "bob");
        filter.column_schema.type_display = DisplayType::String;
        let code = convert_to_code(&[filter], &[], &["name".to_string()], CodeSyntax::Pandas);
        assert_eq!(code.converted_code[0], "mask = (df['name'] == 'bob')");
    }

    #[test]
    fn test_mixed_conditions_fold_left() {
        let first = compare_filter("a", CompareFilterOp::Gt, "3");
        let mut second = compare_filter("a", CompareFilterOp::Eq, "1");
        second.condition = FilterCondition::Or;
        let code = convert_to_code(
            &[first, second],
            &[],
            &["a".to_string()],
            CodeSyntax::Pandas,
        );
        assert_eq!(code.converted_code[0], "mask = (df['a'] > 3) | (df['a'] == 1)");
    }

    #[test]
    fn test_invalid_filters_skipped() {
        let mut filter = compare_filter("a", CompareFilterOp::Gt, "oops");
        filter.is_valid = false;
        let code = convert_to_code(&[filter], &[], &["a".to_string()], CodeSyntax::Pandas);
        assert!(code.converted_code.is_empty());
    }

    #[test]
    fn test_membership_and_search_rendering() {
        let mut member = compare_filter("c", CompareFilterOp::Eq, "x");
        member.column_schema.type_display = DisplayType::String;
        member.kind = FilterKind::SetMembership {
            values: vec!["x".to_string(), "y".to_string()],
            inclusive: false,
        };
        let mut search = compare_filter("c", CompareFilterOp::Eq, "x");
        search.column_schema.type_display = DisplayType::String;
        search.kind = FilterKind::Search {
            search_type: SearchType::StartsWith,
            term: "pre".to_string(),
            case_sensitive: true,
        };
        let code = convert_to_code(
            &[member, search],
            &[],
            &["c".to_string()],
            CodeSyntax::Pandas,
        );
        assert_eq!(
            code.converted_code[0],
            "mask = (~df['c'].isin(['x', 'y'])) & (df['c'].str.startswith('pre'))"
        );
    }

    #[test]
    fn test_unknown_syntax_name() {
        assert!(CodeSyntax::from_name("dplyr").is_err());
        assert_eq!(CodeSyntax::from_name("pandas").unwrap(), CodeSyntax::Pandas);
    }
}

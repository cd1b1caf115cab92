//! Plan evaluation against a dataset snapshot. Lazy Polars all the way
//! down; the input frame is never mutated.

use polars::prelude::*;
use thiserror::Error;

use super::parser::{Agg, AggFunc, CmpOp, Literal, Plan, Stage};

#[derive(Debug, Error)]
pub enum EvalError {
    #[error("unknown column `{name}`; available columns: {available}")]
    UnknownColumn { name: String, available: String },
    #[error("`contains` needs a quoted string value")]
    ContainsNeedsString,
    #[error("comparison is missing a value")]
    MissingValue,
    #[error("{0}")]
    Polars(#[from] PolarsError),
}

#[derive(Debug, Clone)]
pub enum ExecutionOutcome {
    Table(DataFrame),
    Scalar { name: String, value: String },
}

pub fn evaluate(plan: &Plan, df: &DataFrame) -> Result<ExecutionOutcome, EvalError> {
    // Track the live column set so references are checked against the
    // schema each stage actually sees (aliases included).
    let mut columns: Vec<String> =
        df.get_column_names().iter().map(|s| s.to_string()).collect();
    let mut lf = df.clone().lazy();

    for stage in &plan.stages {
        check_stage_columns(stage, &columns)?;
        lf = apply(lf, stage)?;
        columns = columns_after(stage, columns);
    }

    let out = lf.collect()?;

    // A 1x1 frame reads better as a scalar answer.
    if out.height() == 1 && out.width() == 1 {
        let series = &out.get_columns()[0];
        let value = series
            .get(0)
            .map(|v| format!("{}", v))
            .unwrap_or_else(|_| "null".to_string());
        return Ok(ExecutionOutcome::Scalar { name: series.name().to_string(), value });
    }
    Ok(ExecutionOutcome::Table(out))
}

fn check_stage_columns(stage: &Stage, columns: &[String]) -> Result<(), EvalError> {
    let mut referenced: Vec<&str> = Vec::new();
    match stage {
        Stage::Select(cols) | Stage::DropNulls(cols) => {
            referenced.extend(cols.iter().map(|c| c.as_str()))
        }
        Stage::Filter { column, .. } | Stage::Sort { column, .. } => referenced.push(column),
        Stage::GroupBy { keys, aggs } => {
            referenced.extend(keys.iter().map(|k| k.as_str()));
            referenced.extend(aggs.iter().map(|a| a.column.as_str()));
        }
        Stage::Aggregate(aggs) => referenced.extend(aggs.iter().map(|a| a.column.as_str())),
        Stage::Head(_) | Stage::Tail(_) | Stage::Unique | Stage::Count => {}
    }
    for name in referenced {
        if !columns.iter().any(|c| c == name) {
            return Err(EvalError::UnknownColumn {
                name: name.to_string(),
                available: columns.join(", "),
            });
        }
    }
    Ok(())
}

fn columns_after(stage: &Stage, current: Vec<String>) -> Vec<String> {
    match stage {
        Stage::Select(cols) => cols.clone(),
        Stage::GroupBy { keys, aggs } => {
            let mut next = keys.clone();
            next.extend(aggs.iter().map(|a| a.output_name()));
            next
        }
        Stage::Aggregate(aggs) => aggs.iter().map(|a| a.output_name()).collect(),
        Stage::Count => vec!["count".to_string()],
        _ => current,
    }
}

fn apply(lf: LazyFrame, stage: &Stage) -> Result<LazyFrame, EvalError> {
    Ok(match stage {
        Stage::Select(cols) => lf.select(cols.iter().map(|c| col(c)).collect::<Vec<_>>()),
        Stage::Filter { column, op, value } => lf.filter(filter_expr(column, *op, value)?),
        Stage::GroupBy { keys, aggs } => lf
            .group_by(keys.iter().map(|k| col(k)).collect::<Vec<_>>())
            .agg(agg_exprs(aggs)),
        Stage::Aggregate(aggs) => lf.select(agg_exprs(aggs)),
        Stage::Sort { column, descending } => lf.sort(
            [column.as_str()],
            SortMultipleOptions::default().with_order_descending(*descending),
        ),
        Stage::Head(n) => lf.limit(*n as IdxSize),
        Stage::Tail(n) => lf.tail(*n as IdxSize),
        Stage::Unique => lf.unique_stable(None, UniqueKeepStrategy::First),
        Stage::DropNulls(cols) => {
            if cols.is_empty() {
                lf.drop_nulls(None)
            } else {
                lf.drop_nulls(Some(cols.iter().map(|c| col(c)).collect()))
            }
        }
        Stage::Count => lf.select([len().alias("count")]),
    })
}

fn filter_expr(column: &str, op: CmpOp, value: &Option<Literal>) -> Result<Expr, EvalError> {
    let lhs = col(column);
    Ok(match op {
        CmpOp::IsNull => lhs.is_null(),
        CmpOp::NotNull => lhs.is_not_null(),
        CmpOp::Contains => match value {
            Some(Literal::Str(s)) => lhs.str().contains(lit(s.as_str()), false),
            _ => return Err(EvalError::ContainsNeedsString),
        },
        cmp => {
            let rhs = literal_expr(value.as_ref().ok_or(EvalError::MissingValue)?);
            match cmp {
                CmpOp::Eq => lhs.eq(rhs),
                CmpOp::Ne => lhs.neq(rhs),
                CmpOp::Gt => lhs.gt(rhs),
                CmpOp::Ge => lhs.gt_eq(rhs),
                CmpOp::Lt => lhs.lt(rhs),
                CmpOp::Le => lhs.lt_eq(rhs),
                CmpOp::Contains | CmpOp::IsNull | CmpOp::NotNull => unreachable!(),
            }
        }
    })
}

fn literal_expr(value: &Literal) -> Expr {
    match value {
        Literal::Int(i) => lit(*i),
        Literal::Float(f) => lit(*f),
        Literal::Bool(b) => lit(*b),
        Literal::Str(s) => lit(s.as_str()),
    }
}

fn agg_exprs(aggs: &[Agg]) -> Vec<Expr> {
    aggs.iter()
        .map(|a| {
            let e = col(&a.column);
            let e = match a.func {
                AggFunc::Sum => e.sum(),
                AggFunc::Mean => e.mean(),
                AggFunc::Min => e.min(),
                AggFunc::Max => e.max(),
                AggFunc::Median => e.median(),
                AggFunc::Std => e.std(1),
                AggFunc::Count => e.count(),
                AggFunc::NUnique => e.n_unique(),
            };
            e.alias(&a.output_name())
        })
        .collect()
}

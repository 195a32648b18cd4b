//! View step: (re)define a view over relations built by upstream steps.

use salespipe_shared::{MaterializeResult, PipelineError, Result};
use tracing::info;

use super::{Step, StepContext, summarize};

/// Sales rows left-joined to their rep and product attributes.
///
/// Left joins keep every `sales_data` row; unknown reps or products yield
/// NULL reference columns.
pub const JOINED_DATA_SQL: &str = r#"
SELECT
    s."date",
    s.dollar_amount,
    s.customer_name,
    s.quantity,
    r.rep_name,
    r.department,
    r.hire_date,
    p.product_name,
    p.category,
    p.price
FROM sales_data AS s
LEFT JOIN sales_reps AS r ON s.rep_id = r.rep_id
LEFT JOIN products AS p ON s.product_id = p.product_id
"#;

/// Defines a view whose sources are exactly its dependencies.
pub struct ViewStep {
    name: String,
    deps: Vec<String>,
    select_sql: String,
    group: String,
}

impl ViewStep {
    /// A view step reading from `deps`.
    pub fn new(
        name: impl Into<String>,
        deps: impl IntoIterator<Item = impl Into<String>>,
        select_sql: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            deps: deps.into_iter().map(Into::into).collect(),
            select_sql: select_sql.into(),
            group: "analytics".into(),
        }
    }
}

/// The `joined_data` view over `sales_data`, `sales_reps`, and `products`.
pub fn joined_data() -> ViewStep {
    ViewStep::new(
        "joined_data",
        ["sales_data", "sales_reps", "products"],
        JOINED_DATA_SQL,
    )
}

impl Step for ViewStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn deps(&self) -> &[String] {
        &self.deps
    }

    fn group(&self) -> &str {
        &self.group
    }

    fn kind(&self) -> &'static str {
        "view"
    }

    fn materialize(&self, ctx: &StepContext<'_>) -> Result<MaterializeResult> {
        for source in &self.deps {
            if !salespipe_storage::relation_exists(ctx.conn, source)? {
                return Err(PipelineError::MissingTable {
                    table: source.clone(),
                });
            }
        }

        salespipe_storage::replace_view(ctx.conn, &self.name, &self.select_sql)?;
        let result = summarize(ctx, &self.name)?;
        info!(run_id = %ctx.run_id, view = %self.name, rows = result.row_count, "view defined");
        Ok(result)
    }
}

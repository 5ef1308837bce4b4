use rusqlite::types::Value;

/// Accumulates `column = ?N` clauses for the equality-only finders.
#[derive(Default)]
pub(crate) struct Criteria {
    clauses: Vec<String>,
    values: Vec<Value>,
}

impl Criteria {
    pub(crate) fn eq(&mut self, column: &str, value: impl Into<Value>) -> &mut Self {
        self.values.push(value.into());
        self.clauses.push(format!("{column} = ?{}", self.values.len()));
        self
    }

    /// A clause with no bound parameter, such as `return_date IS NULL`.
    pub(crate) fn raw(&mut self, clause: &str) -> &mut Self {
        self.clauses.push(clause.to_string());
        self
    }

    /// Empty when nothing was constrained, which matches every row.
    pub(crate) fn where_clause(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }

    pub(crate) fn values(&self) -> &[Value] {
        &self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_parameters_in_order() {
        let mut criteria = Criteria::default();
        criteria
            .eq("title", "Dune".to_string())
            .raw("return_date IS NULL")
            .eq("total_copies", 2i64);
        assert_eq!(
            criteria.where_clause(),
            " WHERE title = ?1 AND return_date IS NULL AND total_copies = ?2"
        );
        assert_eq!(criteria.values().len(), 2);
    }

    #[test]
    fn no_constraints_means_no_where() {
        assert_eq!(Criteria::default().where_clause(), "");
    }
}

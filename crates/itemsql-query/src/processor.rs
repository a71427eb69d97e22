//! Statement execution against a set of stored tables
//!
//! [`SqlProcessor`] binds every table of a FROM formula to its definition and
//! rows, builds the joined source table and runs the select over it. Columns
//! are qualified by the table's variable name when one is given, else by the
//! table name.

use crate::executor::{SelectExecutor, SelectResult};
use crate::from_parser::{JoinKind, TableFormula};
use crate::schema::{TableDef, column_getter_factory};
use crate::statement::SelectStatement;
use itemsql_core::{EngineConfig, Error, ItemTable, Result};
use tracing::{debug, info};

/// Source of named tables
pub trait TableProvider {
    /// Definition and rows of the table called `name`
    fn lookup(&self, name: &str) -> Option<(&TableDef, &ItemTable)>;
}

impl TableProvider for [(TableDef, ItemTable)] {
    fn lookup(&self, name: &str) -> Option<(&TableDef, &ItemTable)> {
        self.iter()
            .find(|(def, _)| def.name.eq_ignore_ascii_case(name))
            .map(|(def, table)| (def, table))
    }
}

/// A FROM table bound to its stored rows. `def` is renamed to the label.
struct BoundTable<'a> {
    def: TableDef,
    table: &'a ItemTable,
}

enum Joined<'a> {
    Stored(&'a ItemTable),
    Built(ItemTable),
}

impl Joined<'_> {
    fn table(&self) -> &ItemTable {
        match self {
            Joined::Stored(table) => table,
            Joined::Built(table) => table,
        }
    }
}

/// Position of `name` within the concatenated columns of `layout`
fn locate(layout: &[&TableDef], name: &str) -> Result<Option<usize>> {
    let mut offset = 0;
    let mut found = None;
    for def in layout {
        if let Some(index) = def.column_index(name) {
            if found.is_some() {
                return Err(Error::QueryParse(format!("Ambiguous column name: {}", name)));
            }
            found = Some(offset + index);
        }
        offset += def.columns.len();
    }
    Ok(found)
}

/// Column indices of an ON equality, accepting either side first
fn join_columns(
    left: &[&TableDef],
    right: &[&TableDef],
    first: &str,
    second: &str,
) -> Result<(usize, usize)> {
    if let (Some(l), Some(r)) = (locate(left, first)?, locate(right, second)?) {
        return Ok((l, r));
    }
    if let (Some(l), Some(r)) = (locate(left, second)?, locate(right, first)?) {
        return Ok((l, r));
    }
    Err(Error::QueryParse(format!(
        "Join condition {} = {} must compare a column of each side",
        first, second
    )))
}

/// Runs SELECT statements over the tables of a provider
pub struct SqlProcessor<'a, P: TableProvider + ?Sized> {
    provider: &'a P,
    config: EngineConfig,
}

impl<'a, P: TableProvider + ?Sized> SqlProcessor<'a, P> {
    pub fn new(provider: &'a P, config: &EngineConfig) -> Self {
        Self {
            provider,
            config: config.clone(),
        }
    }

    /// Parse and run a whole statement
    pub fn select(&self, query: &str) -> Result<SelectResult> {
        info!("SELECT statement: {}", query);
        let statement = SelectStatement::parse(query)?;
        self.execute(&statement)
    }

    /// Run an already split statement
    pub fn execute(&self, statement: &SelectStatement) -> Result<SelectResult> {
        let bound = self.bind(&statement.from)?;
        let mut next = 0;
        let (source, _) = self.join(&statement.from, &bound, &mut next)?;

        let defs: Vec<TableDef> = bound.iter().map(|entry| entry.def.clone()).collect();
        let wildcard_names: Vec<String> = defs
            .iter()
            .flat_map(|def| {
                def.columns
                    .iter()
                    .map(move |column| format!("{}.{}", def.name, column.name))
            })
            .collect();

        let mut executor = SelectExecutor::parse(
            &statement.columns,
            statement.where_clause.as_deref(),
            column_getter_factory(&defs),
            &self.config,
        )?
        .with_wildcard_names(wildcard_names)
        .with_order_by(statement.order_by.clone())
        .with_limit(statement.limit);
        executor.execute(source.table())
    }

    fn bind(&self, from: &TableFormula) -> Result<Vec<BoundTable<'a>>> {
        let mut bound: Vec<BoundTable<'a>> = Vec::new();
        for table_ref in from.tables() {
            let (def, table) = self
                .provider
                .lookup(&table_ref.name)
                .ok_or_else(|| Error::QueryParse(format!("Unknown table: {}", table_ref.name)))?;
            let label = table_ref.label();
            for entry in &bound {
                if entry.def.name.eq_ignore_ascii_case(label) {
                    return Err(Error::QueryParse(format!(
                        "Duplicate table name or variable: {}",
                        label
                    )));
                }
                if entry.def.group_id == def.group_id {
                    return Err(Error::QueryParse(format!(
                        "Table {} is used more than once",
                        table_ref.name
                    )));
                }
            }
            let mut def = def.clone();
            def.name = label.to_string();
            bound.push(BoundTable { def, table });
        }
        Ok(bound)
    }

    /// Build the joined table for `formula` and report its column layout
    fn join<'b>(
        &self,
        formula: &TableFormula,
        bound: &'b [BoundTable<'a>],
        next: &mut usize,
    ) -> Result<(Joined<'a>, Vec<&'b TableDef>)> {
        match formula {
            TableFormula::Table(table_ref) => {
                let entry = bound.get(*next).ok_or_else(|| {
                    Error::Internal(format!("Table {} was not bound", table_ref.name))
                })?;
                *next += 1;
                Ok((Joined::Stored(entry.table), vec![&entry.def]))
            }
            TableFormula::CrossJoin { left, right } => {
                let (left, mut layout) = self.join(left, bound, next)?;
                let (right, right_layout) = self.join(right, bound, next)?;
                let joined = left.table().cross_join(right.table())?;
                layout.extend(right_layout);
                Ok((Joined::Built(joined), layout))
            }
            TableFormula::Join {
                kind,
                left,
                right,
                left_column,
                right_column,
            } => {
                let (left, mut layout) = self.join(left, bound, next)?;
                let (right, right_layout) = self.join(right, bound, next)?;
                let (l, r) = join_columns(&layout, &right_layout, left_column, right_column)?;
                debug!("{} on column {} = column {}", kind, l, r);
                let (left, right) = (left.table(), right.table());
                let joined = match kind {
                    JoinKind::Inner => left.inner_join(right, l, r)?,
                    JoinKind::LeftOuter => left.left_outer_join(right, l, r)?,
                    JoinKind::RightOuter => left.right_outer_join(right, l, r)?,
                    JoinKind::FullOuter => left.full_outer_join(right, l, r)?,
                };
                layout.extend(right_layout);
                Ok((Joined::Built(joined), layout))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use itemsql_core::{ItemData, ItemDataType};

    fn tables() -> Vec<(TableDef, ItemTable)> {
        let config = EngineConfig::for_testing();
        let people = TableDef::new("people", 1)
            .with_column("id", 100, ItemDataType::Int)
            .with_column("name", 101, ItemDataType::String);
        let heights = TableDef::new("heights", 2)
            .with_column("person", 200, ItemDataType::Int)
            .with_column("height", 201, ItemDataType::Int);

        let people_table = people.create_table(&config).unwrap();
        for (id, name) in [(1i64, "anri"), (2, "mai"), (3, "nobi")] {
            let row = people_table.add_new_group().unwrap();
            row.add(ItemData::shared(100, id)).unwrap();
            row.add(ItemData::shared(101, name)).unwrap();
        }
        let heights_table = heights.create_table(&config).unwrap();
        for (person, height) in [(1i64, 150i64), (2, 180), (1, 250), (9, 170)] {
            let row = heights_table.add_new_group().unwrap();
            row.add(ItemData::shared(200, person)).unwrap();
            row.add(ItemData::shared(201, height)).unwrap();
        }
        vec![(people, people_table), (heights, heights_table)]
    }

    fn select(query: &str) -> Result<SelectResult> {
        let tables = tables();
        SqlProcessor::new(tables.as_slice(), &EngineConfig::for_testing()).select(query)
    }

    #[test]
    fn test_inner_join_with_variables() {
        let result = select(
            "select p.name, h.height from people p inner join heights h on p.id = h.person",
        )
        .unwrap();
        assert_eq!(
            result.text_rows(),
            vec![vec!["anri", "150"], vec!["anri", "250"], vec!["mai", "180"]]
        );
        assert_eq!(result.columns, vec!["p.name", "h.height"]);
        assert_eq!(result.stats.rows_scanned, 3);
    }

    #[test]
    fn test_join_condition_either_way_round() {
        let result =
            select("select name from heights join people on people.id = heights.person").unwrap();
        assert_eq!(result.text_rows(), vec![vec!["anri"], vec!["mai"], vec!["anri"]]);
    }

    #[test]
    fn test_outer_joins() {
        let result = select(
            "select name, height from people left join heights on id = person order by name",
        )
        .unwrap();
        assert_eq!(
            result.text_rows(),
            vec![
                vec!["anri", "150"],
                vec!["anri", "250"],
                vec!["mai", "180"],
                vec!["nobi", "NULL"],
            ]
        );

        let result =
            select("select name, height from people full outer join heights on id = person")
                .unwrap();
        let rows = result.text_rows();
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[3], vec!["nobi", "NULL"]);
        assert_eq!(rows[4], vec!["NULL", "170"]);
    }

    #[test]
    fn test_variable_hides_table_name() {
        let err = select("select people.name from people p").unwrap_err();
        assert!(matches!(err, Error::ColumnNotFound(_)));

        let result = select("select * from people p where p.id = 2").unwrap();
        assert_eq!(result.columns, vec!["p.id", "p.name"]);
        assert_eq!(result.text_rows(), vec![vec!["2", "mai"]]);
    }

    #[test]
    fn test_order_and_limit() {
        let result =
            select("select person, height as h from heights order by h desc limit 2").unwrap();
        assert_eq!(result.text_rows(), vec![vec!["1", "250"], vec!["2", "180"]]);
        assert_eq!(result.stats.rows_returned, 2);
    }

    #[test]
    fn test_binding_errors() {
        let error = |query: &str| select(query).unwrap_err().to_string();
        assert!(error("select * from hosts").contains("Unknown table: hosts"));
        assert!(error("select * from people a, heights a").contains("Duplicate table"));
        assert!(error("select * from people a, people b").contains("used more than once"));
        assert!(error("select * from people join heights on id = name")
            .contains("must compare a column of each side"));
    }
}

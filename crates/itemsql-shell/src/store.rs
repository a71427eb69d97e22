//! Virtual monitoring-server data store
//!
//! A fixed set of in-memory tables shaped like the configuration and user
//! tables of a monitoring server. Each table's item ids are its group id
//! times 1000 plus the column position, so ids never collide across tables
//! and joined rows can still be resolved by item id.

use itemsql_core::{EngineConfig, ItemDataType, ItemGroupId, ItemTable, Result};
use itemsql_query::schema::create_item_data;
use itemsql_query::{SelectResult, SelectStatement, SqlProcessor, TableDef, TableFormula};
use tracing::{debug, info};

pub const GROUP_ID_CONFIG: ItemGroupId = 1;
pub const GROUP_ID_USERS: ItemGroupId = 2;
pub const GROUP_ID_USRGRP: ItemGroupId = 3;
pub const GROUP_ID_USERS_GROUPS: ItemGroupId = 4;

type ColumnSpec = (&'static str, ItemDataType);

const CONFIG_COLUMNS: &[ColumnSpec] = &[
    ("configid", ItemDataType::Uint64),
    ("alert_history", ItemDataType::Int),
    ("event_history", ItemDataType::Int),
    ("refresh_unsupported", ItemDataType::Int),
    ("work_period", ItemDataType::String),
    ("alert_usrgrpid", ItemDataType::Uint64),
    ("event_ack_enable", ItemDataType::Int),
    ("event_expire", ItemDataType::Int),
    ("event_show_max", ItemDataType::Int),
    ("default_theme", ItemDataType::String),
    ("authentication_type", ItemDataType::Int),
    ("ldap_host", ItemDataType::String),
    ("ldap_port", ItemDataType::Int),
    ("discovery_groupid", ItemDataType::Uint64),
    ("max_in_table", ItemDataType::Int),
    ("search_limit", ItemDataType::Int),
    ("ok_period", ItemDataType::Int),
    ("blink_period", ItemDataType::Int),
    ("server_check_interval", ItemDataType::Int),
];

const CONFIG_ROWS: &[&[&str]] = &[&[
    "1",
    "365",
    "365",
    "600",
    "1-5,09:00-18:00;",
    "7",
    "1",
    "7",
    "100",
    "originalblue",
    "0",
    "",
    "389",
    "5",
    "50",
    "100",
    "1800",
    "1800",
    "10",
]];

const USERS_COLUMNS: &[ColumnSpec] = &[
    ("userid", ItemDataType::Uint64),
    ("alias", ItemDataType::String),
    ("name", ItemDataType::String),
    ("surname", ItemDataType::String),
    ("autologin", ItemDataType::Int),
    ("autologout", ItemDataType::Int),
    ("type", ItemDataType::Int),
];

const USERS_ROWS: &[&[&str]] = &[
    &["1", "Admin", "Zabbix", "Administrator", "1", "0", "3"],
    &["2", "guest", "", "", "0", "900", "1"],
];

const USRGRP_COLUMNS: &[ColumnSpec] = &[
    ("usrgrpid", ItemDataType::Uint64),
    ("grpname", ItemDataType::String),
    ("gui_access", ItemDataType::Int),
    ("users_status", ItemDataType::Int),
];

const USRGRP_ROWS: &[&[&str]] = &[
    &["7", "Zabbix administrators", "0", "0"],
    &["8", "Guests", "0", "0"],
];

const USERS_GROUPS_COLUMNS: &[ColumnSpec] = &[
    ("id", ItemDataType::Uint64),
    ("usrgrpid", ItemDataType::Uint64),
    ("userid", ItemDataType::Uint64),
];

const USERS_GROUPS_ROWS: &[&[&str]] = &[&["1", "7", "1"], &["2", "8", "2"]];

fn table_def(name: &str, group_id: ItemGroupId, columns: &[ColumnSpec]) -> TableDef {
    columns
        .iter()
        .enumerate()
        .fold(TableDef::new(name, group_id), |def, (index, (column, data_type))| {
            def.with_column(*column, group_id * 1000 + index as u64, *data_type)
        })
}

/// In-memory tables addressed by name
#[derive(Debug)]
pub struct VirtualDataStore {
    config: EngineConfig,
    tables: Vec<(TableDef, ItemTable)>,
}

impl VirtualDataStore {
    /// Build the store and fill every table
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let mut store = Self {
            config: config.clone(),
            tables: Vec::new(),
        };
        store.load("config", GROUP_ID_CONFIG, CONFIG_COLUMNS, CONFIG_ROWS)?;
        store.load("users", GROUP_ID_USERS, USERS_COLUMNS, USERS_ROWS)?;
        store.load("usrgrp", GROUP_ID_USRGRP, USRGRP_COLUMNS, USRGRP_ROWS)?;
        store.load(
            "users_groups",
            GROUP_ID_USERS_GROUPS,
            USERS_GROUPS_COLUMNS,
            USERS_GROUPS_ROWS,
        )?;
        info!("Virtual data store ready with {} tables", store.tables.len());
        Ok(store)
    }

    fn load(
        &mut self,
        name: &str,
        group_id: ItemGroupId,
        columns: &[ColumnSpec],
        rows: &[&[&str]],
    ) -> Result<()> {
        let def = table_def(name, group_id, columns);
        let table = def.create_table(&self.config)?;
        for values in rows {
            let row = table.add_new_group()?;
            for (column, text) in def.columns.iter().zip(values.iter()) {
                row.add(create_item_data(column, text)?)?;
            }
        }
        debug!("Loaded table {} with {} row(s)", name, table.len());
        self.tables.push((def, table));
        Ok(())
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.iter().map(|(def, _)| def.name.clone()).collect()
    }

    pub fn table_def(&self, name: &str) -> Option<&TableDef> {
        self.find(name).map(|(def, _)| def)
    }

    pub fn table(&self, name: &str) -> Option<&ItemTable> {
        self.find(name).map(|(_, table)| table)
    }

    fn find(&self, name: &str) -> Option<&(TableDef, ItemTable)> {
        self.tables
            .iter()
            .find(|(def, _)| def.name.eq_ignore_ascii_case(name))
    }

    /// Run a whole SELECT statement
    pub fn query(&self, statement: &str) -> Result<SelectResult> {
        SqlProcessor::new(self.tables.as_slice(), &self.config).select(statement)
    }

    /// Run a select over the cross join of the comma-separated `tables`
    pub fn select(
        &self,
        tables: &str,
        columns: &str,
        where_clause: Option<&str>,
    ) -> Result<SelectResult> {
        let names: Vec<&str> = tables
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .collect();
        let statement = SelectStatement::new(columns, TableFormula::cross_join_of(&names)?)
            .with_where(where_clause);
        SqlProcessor::new(self.tables.as_slice(), &self.config).execute(&statement)
    }
}

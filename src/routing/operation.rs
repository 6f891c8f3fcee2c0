//! The closed set of operation kinds a connection understands.

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::routing::table::{Role, RoutingError};

macro_rules! operation_kinds {
    ($($variant:ident = $name:literal => $role:ident,)+) => {
        /// A classified category of connection operation.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum OperationKind {
            $($variant,)+
        }

        impl OperationKind {
            /// Every operation kind, in declaration order.
            pub const ALL: &'static [OperationKind] = &[$(OperationKind::$variant,)+];

            /// Stable snake_case name used in configuration and logs.
            pub fn name(self) -> &'static str {
                match self {
                    $(OperationKind::$variant => $name,)+
                }
            }

            /// Role assigned by the built-in classification.
            pub fn standard_role(self) -> Role {
                match self {
                    $(OperationKind::$variant => Role::$role,)+
                }
            }
        }
    };
}

operation_kinds! {
    // Queries
    Select = "select" => ReplicaSafe,
    SelectAll = "select_all" => ReplicaSafe,
    SelectOne = "select_one" => ReplicaSafe,
    SelectRows = "select_rows" => ReplicaSafe,
    SelectValue = "select_value" => ReplicaSafe,
    SelectValues = "select_values" => ReplicaSafe,
    ToSql = "to_sql" => ReplicaSafe,
    SubstituteAt = "substitute_at" => ReplicaSafe,
    SanitizeLimit = "sanitize_limit" => ReplicaSafe,
    QuoteColumnName = "quote_column_name" => ReplicaSafe,
    QuoteTableName = "quote_table_name" => ReplicaSafe,

    // Metadata introspection
    Columns = "columns" => ReplicaSafe,
    ColumnNameForOperation = "column_name_for_operation" => ReplicaSafe,
    SchemaCache = "schema_cache" => ReplicaSafe,

    // Query cache control
    ClearQueryCache = "clear_query_cache" => ReplicaSafe,
    EnableQueryCache = "enable_query_cache" => ReplicaSafe,
    DisableQueryCache = "disable_query_cache" => ReplicaSafe,
    QueryCacheEnabled = "query_cache_enabled" => ReplicaSafe,

    // Session liveness
    Active = "active" => ReplicaSafe,
    Verify = "verify" => ReplicaSafe,
    Reconnect = "reconnect" => ReplicaSafe,
    Disconnect = "disconnect" => ReplicaSafe,
    RawConnection = "raw_connection" => ReplicaSafe,

    // Schema changes
    AddColumn = "add_column" => PrimaryRequired,
    AddForeignKey = "add_foreign_key" => PrimaryRequired,
    AddIndex = "add_index" => PrimaryRequired,
    AddReference = "add_reference" => PrimaryRequired,
    AddTimestamps = "add_timestamps" => PrimaryRequired,
    ChangeColumn = "change_column" => PrimaryRequired,
    ChangeColumnDefault = "change_column_default" => PrimaryRequired,
    ChangeColumnNull = "change_column_null" => PrimaryRequired,
    CreateJoinTable = "create_join_table" => PrimaryRequired,
    CreateTable = "create_table" => PrimaryRequired,
    DropJoinTable = "drop_join_table" => PrimaryRequired,
    DropTable = "drop_table" => PrimaryRequired,
    EnableExtension = "enable_extension" => PrimaryRequired,
    Execute = "execute" => PrimaryRequired,
    ExecuteBlock = "execute_block" => PrimaryRequired,
    InitializeSchemaMigrationsTable = "initialize_schema_migrations_table" => PrimaryRequired,
    RemoveColumn = "remove_column" => PrimaryRequired,
    RemoveColumns = "remove_columns" => PrimaryRequired,
    RemoveForeignKey = "remove_foreign_key" => PrimaryRequired,
    RemoveIndex = "remove_index" => PrimaryRequired,
    RemoveReference = "remove_reference" => PrimaryRequired,
    RemoveTimestamps = "remove_timestamps" => PrimaryRequired,
    RenameColumn = "rename_column" => PrimaryRequired,
    RenameIndex = "rename_index" => PrimaryRequired,
    RenameTable = "rename_table" => PrimaryRequired,
    AssumeMigratedUptoVersion = "assume_migrated_upto_version" => PrimaryRequired,
    MigrationKeys = "migration_keys" => PrimaryRequired,

    // Writes
    Insert = "insert" => PrimaryRequired,
    Update = "update" => PrimaryRequired,
    Delete = "delete" => PrimaryRequired,
    Truncate = "truncate" => PrimaryRequired,

    // Sequence allocation
    NextSequenceValue = "next_sequence_value" => PrimaryRequired,
    PrefetchPrimaryKey = "prefetch_primary_key" => PrimaryRequired,

    // Transaction demarcation
    Transaction = "transaction" => PrimaryRequired,
    TransactionState = "transaction_state" => PrimaryRequired,
    BeginTransaction = "begin_transaction" => PrimaryRequired,
    CommitTransaction = "commit_transaction" => PrimaryRequired,
    RollbackTransaction = "rollback_transaction" => PrimaryRequired,

    // Authoritative catalog lookups
    PrimaryKey = "primary_key" => PrimaryRequired,
    Tables = "tables" => PrimaryRequired,
    TableExists = "table_exists" => PrimaryRequired,
    Indexes = "indexes" => PrimaryRequired,
    ForeignKeys = "foreign_keys" => PrimaryRequired,
    ColumnSpec = "column_spec" => PrimaryRequired,
    NativeDatabaseTypes = "native_database_types" => PrimaryRequired,
    ValidType = "valid_type" => PrimaryRequired,

    // Capability probes
    SupportsDdlTransactions = "supports_ddl_transactions" => PrimaryRequired,
    SupportsExplain = "supports_explain" => PrimaryRequired,
    SupportsExtensions = "supports_extensions" => PrimaryRequired,
    SupportsForeignKeys = "supports_foreign_keys" => PrimaryRequired,
    SupportsIndexSortOrder = "supports_index_sort_order" => PrimaryRequired,
    SupportsMaterializedViews = "supports_materialized_views" => PrimaryRequired,
    SupportsMigrations = "supports_migrations" => PrimaryRequired,
    SupportsPartialIndex = "supports_partial_index" => PrimaryRequired,
    SupportsPrimaryKey = "supports_primary_key" => PrimaryRequired,
    SupportsRanges = "supports_ranges" => PrimaryRequired,
    SupportsStatementCache = "supports_statement_cache" => PrimaryRequired,
    SupportsTransactionIsolation = "supports_transaction_isolation" => PrimaryRequired,
    SupportsViews = "supports_views" => PrimaryRequired,
}

impl OperationKind {
    /// Position of this kind in [`OperationKind::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OperationKind {
    type Err = RoutingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OperationKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| RoutingError::UnknownOperation(s.to_string()))
    }
}

impl Serialize for OperationKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

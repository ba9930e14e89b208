use config::shared::TargetConfig;
use tracing::debug;

use crate::bail;
use crate::error::{ErrorKind, SinkResult};
use crate::schema::flatten::flatten_fields;
use crate::schema::mapper::TypeMapper;
use crate::schema::metadata::{is_metadata_column, metadata_columns};
use crate::schema::naming::conform_name;
use crate::schema::widen::{Widening, widen};
use crate::types::{
    DestinationColumn, DestinationTable, FieldSchema, SqlType, StreamSchema, TableName,
};

/// A single schema change on the destination.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum DdlOperation {
    CreateTable(DestinationTable),
    AddColumn {
        table: TableName,
        column: DestinationColumn,
    },
    /// Alters `column.name` from `from` to `column.sql_type`, keeping its nullability.
    WidenColumn {
        table: TableName,
        column: DestinationColumn,
        from: SqlType,
    },
    /// Drops the `NOT NULL` constraint of a column the stream no longer declares.
    MakeNullable {
        table: TableName,
        column: DestinationColumn,
    },
}

/// Ordered DDL operations that make a table a superset of a stream shape.
///
/// Plans never drop or narrow anything, and planning against a table the plan was already
/// applied to yields an empty plan.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct DdlPlan {
    operations: Vec<DdlOperation>,
}

impl DdlPlan {
    pub fn new(operations: Vec<DdlOperation>) -> DdlPlan {
        DdlPlan { operations }
    }

    pub fn operations(&self) -> &[DdlOperation] {
        &self.operations
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Applies the plan to the cached definition of its table.
    pub fn apply_to(&self, definition: &mut Option<DestinationTable>) {
        for operation in &self.operations {
            match operation {
                DdlOperation::CreateTable(table) => *definition = Some(table.clone()),
                DdlOperation::AddColumn { column, .. } => {
                    if let Some(definition) = definition {
                        definition.push_column(column.clone());
                    }
                }
                DdlOperation::WidenColumn { column, .. } => {
                    if let Some(existing) = definition
                        .as_mut()
                        .and_then(|definition| definition.column_mut(&column.name))
                    {
                        existing.sql_type = column.sql_type.clone();
                    }
                }
                DdlOperation::MakeNullable { column, .. } => {
                    if let Some(existing) = definition
                        .as_mut()
                        .and_then(|definition| definition.column_mut(&column.name))
                    {
                        existing.nullable = true;
                    }
                }
            }
        }
    }
}

/// Columns a stream revision declares, after flattening, conforming and type mapping.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct StreamShape {
    /// Data columns in declaration order. Metadata columns are not included.
    pub columns: Vec<DestinationColumn>,
    /// Conformed key columns in declaration order.
    pub key_columns: Vec<String>,
    /// Conformed columns every record must carry.
    pub required_columns: Vec<String>,
}

impl StreamShape {
    pub fn column(&self, name: &str) -> Option<&DestinationColumn> {
        self.columns.iter().find(|column| column.name == name)
    }
}

/// Plans the DDL keeping destination tables in line with the streams loaded into them.
#[derive(Debug, Clone)]
pub struct SchemaReconciler {
    mapper: TypeMapper,
    flattening_depth: usize,
    add_record_metadata: bool,
}

impl SchemaReconciler {
    pub fn new(
        mapper: TypeMapper,
        flattening_depth: usize,
        add_record_metadata: bool,
    ) -> SchemaReconciler {
        SchemaReconciler {
            mapper,
            flattening_depth,
            add_record_metadata,
        }
    }

    pub fn from_config(config: &TargetConfig) -> SchemaReconciler {
        SchemaReconciler::new(
            TypeMapper::from_config(config),
            config.flattening_depth(),
            config.add_record_metadata,
        )
    }

    pub fn flattening_depth(&self) -> usize {
        self.flattening_depth
    }

    pub fn mapper(&self) -> &TypeMapper {
        &self.mapper
    }

    /// Computes the columns a stream schema declares.
    ///
    /// Fails with [`ErrorKind::InvalidSchema`] when a key property is not a declared field.
    pub fn shape(&self, schema: &StreamSchema) -> SinkResult<StreamShape> {
        let fields = flatten_fields(&schema.fields, self.flattening_depth);

        let key_columns: Vec<String> = schema
            .key_properties
            .iter()
            .map(|key| conform_name(key))
            .collect();

        for key in &key_columns {
            if !fields.iter().any(|field| &field.name == key) {
                bail!(
                    ErrorKind::InvalidSchema,
                    "Key property is not declared in the stream schema",
                    format!("stream `{}` declares key `{key}` without a matching property", schema.stream)
                );
            }
        }

        let columns = fields
            .iter()
            .filter(|field| !is_metadata_column(&field.name))
            .map(|field| {
                let is_key = key_columns.contains(&field.name);
                DestinationColumn::new(field.name.clone(), self.mapper.map(field, is_key), !is_key)
            })
            .collect();

        let required_columns = fields
            .iter()
            .filter(|field| field.required)
            .map(|field| field.name.clone())
            .collect();

        Ok(StreamShape {
            columns,
            key_columns,
            required_columns,
        })
    }

    /// Plans the DDL that makes `current` a superset of `shape` and the metadata columns.
    ///
    /// A missing table is created with the key columns as primary key. Existing columns the
    /// shape no longer declares are kept and made nullable.
    pub fn reconcile(
        &self,
        table: &TableName,
        current: Option<&DestinationTable>,
        shape: &StreamShape,
    ) -> SinkResult<DdlPlan> {
        let Some(current) = current else {
            let mut columns = shape.columns.clone();
            columns.extend(metadata_columns(self.add_record_metadata));

            debug!(%table, columns = columns.len(), "planning table creation");

            return Ok(DdlPlan::new(vec![DdlOperation::CreateTable(
                DestinationTable::new(table.clone(), columns, shape.key_columns.clone()),
            )]));
        };

        let mut desired = shape.columns.clone();
        desired.extend(metadata_columns(self.add_record_metadata));

        let mut operations = plan_columns(table, current, &desired)?;

        for column in &current.columns {
            let declared = desired.iter().any(|desired| desired.name == column.name);
            let in_primary_key = current.primary_key.contains(&column.name);

            if !declared && !in_primary_key && !column.nullable {
                operations.push(DdlOperation::MakeNullable {
                    table: table.clone(),
                    column: DestinationColumn::new(
                        column.name.clone(),
                        column.sql_type.clone(),
                        true,
                    ),
                });
            }
        }

        Ok(DdlPlan::new(operations))
    }

    /// Plans the additions required by undeclared fields a record carried.
    ///
    /// `fields` are named by column already. Only adds or widens columns. A value no widening
    /// can hold turns its column into `LONGTEXT`.
    pub fn reconcile_inferred(
        &self,
        current: &DestinationTable,
        fields: &[FieldSchema],
    ) -> SinkResult<DdlPlan> {
        let columns: Vec<DestinationColumn> = fields
            .iter()
            .filter(|field| !is_metadata_column(&field.name))
            .map(|field| {
                let mut sql_type = self.mapper.map(field, false);
                if let Some(existing) = current.column(&field.name)
                    && widen(&existing.sql_type, &sql_type) == Widening::Conflict
                {
                    sql_type = SqlType::Text;
                }

                DestinationColumn::new(field.name.clone(), sql_type, true)
            })
            .collect();

        Ok(DdlPlan::new(plan_columns(&current.name, current, &columns)?))
    }

    /// Returns whether a column of type `existing` already holds the values of an undeclared
    /// field.
    pub fn holds_inferred(&self, existing: &SqlType, field: &FieldSchema) -> bool {
        widen(existing, &self.mapper.map(field, false)) == Widening::Satisfied
    }
}

/// Adds missing columns and widens narrower ones.
fn plan_columns(
    table: &TableName,
    current: &DestinationTable,
    desired: &[DestinationColumn],
) -> SinkResult<Vec<DdlOperation>> {
    let mut operations = Vec::new();

    for column in desired {
        let Some(existing) = current.column(&column.name) else {
            operations.push(DdlOperation::AddColumn {
                table: table.clone(),
                column: DestinationColumn::new(column.name.clone(), column.sql_type.clone(), true),
            });
            continue;
        };

        match widen(&existing.sql_type, &column.sql_type) {
            Widening::Satisfied => {}
            Widening::Widen(sql_type) => operations.push(DdlOperation::WidenColumn {
                table: table.clone(),
                column: DestinationColumn::new(column.name.clone(), sql_type, existing.nullable),
                from: existing.sql_type.clone(),
            }),
            Widening::Conflict => bail!(
                ErrorKind::SchemaConflict,
                "Column type cannot be widened to the requested type",
                format!(
                    "column `{}` of {table} is {} but {} was requested",
                    column.name, existing.sql_type, column.sql_type
                )
            ),
        }
    }

    Ok(operations)
}

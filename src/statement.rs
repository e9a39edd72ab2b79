//! 행 이벤트 → SQL 문장 생성 및 패스스루 문장의 대상 테이블 추출

use crate::codec::ValueCodec;
use crate::error::{CdcError, Result};
use crate::events::{CellValue, ColumnBitmap, DeleteRowsData, OperationType, UpdateRowsData, WriteRowsData};
use crate::schema::{ColumnDef, ColumnSchema};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// slot 값을 담는 컬럼명 (대소문자 무시)
pub const SLOT_COLUMN: &str = "_slot";

/// UPDATE/DELETE 이벤트에 여러 행이 있을 때의 처리 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowBatchMode {
    /// 첫 번째 행만 변환
    #[default]
    FirstRow,
    /// 행마다 문장 하나씩 생성
    AllRows,
}

/// UPDATE의 WHERE 절에 사용할 행 이미지
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateWhereImage {
    /// 변경 후 값으로 WHERE 절 구성
    #[default]
    After,
    /// 변경 전 값으로 WHERE 절 구성
    Before,
}

/// 생성된 문장과 관찰된 slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowStatement {
    pub op: OperationType,
    pub sql: String,
    pub slot: Option<i64>,
}

/// 한 테이블에 대한 SQL 생성기
pub struct StatementBuilder<'a> {
    table: &'a str,
    schema: &'a ColumnSchema,
    codec: &'a ValueCodec,
}

impl<'a> StatementBuilder<'a> {
    pub fn new(table: &'a str, schema: &'a ColumnSchema, codec: &'a ValueCodec) -> Self {
        StatementBuilder {
            table,
            schema,
            codec,
        }
    }

    /// 포함된 컬럼을 비트 순서대로 해석
    fn columns(&self, bitmap: &ColumnBitmap) -> Result<Vec<&'a ColumnDef>> {
        let schema: &'a ColumnSchema = self.schema;
        bitmap.iter_set().map(|bit| schema.column_at_bit(bit)).collect()
    }

    /// 이벤트의 모든 행을 담은 multi-row INSERT
    pub fn insert(&self, data: &WriteRowsData) -> Result<Option<RowStatement>> {
        if data.rows.is_empty() {
            return Ok(None);
        }

        let columns = self.columns(&data.columns_present)?;
        let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();

        let mut slot = None;
        let mut tuples = Vec::with_capacity(data.rows.len());
        for row in &data.rows {
            check_row_width(row, columns.len())?;
            let mut values = Vec::with_capacity(columns.len());
            for (column, value) in columns.iter().zip(row) {
                if let Some(s) = capture_slot(column, value)? {
                    slot = Some(s);
                }
                values.push(self.codec.encode(value, &column.data_type));
            }
            tuples.push(format!("({})", values.join(",")));
        }

        Ok(Some(RowStatement {
            op: OperationType::Insert,
            sql: format!(
                "insert into {}({}) values {}",
                self.table,
                names.join(","),
                tuples.join(",")
            ),
            slot,
        }))
    }

    pub fn update(
        &self,
        data: &UpdateRowsData,
        mode: RowBatchMode,
        where_image: UpdateWhereImage,
    ) -> Result<Vec<RowStatement>> {
        let set_columns = self.columns(&data.columns_after)?;
        let where_columns = self.columns(&data.columns_before)?;
        if where_image == UpdateWhereImage::After && data.columns_before != data.columns_after {
            return Err(CdcError::TranslationError(
                "Before and after images include different columns".to_string(),
            ));
        }

        select_rows(&data.rows, mode)
            .iter()
            .map(|(before, after)| {
                check_row_width(before, where_columns.len())?;
                check_row_width(after, set_columns.len())?;
                let assignments = set_columns
                    .iter()
                    .enumerate()
                    .map(|(i, column)| {
                        let value = cell(after, i)?;
                        Ok(format!("{}={}", column.name, self.codec.encode(value, &column.data_type)))
                    })
                    .collect::<Result<Vec<_>>>()?;

                let image = match where_image {
                    UpdateWhereImage::After => after,
                    UpdateWhereImage::Before => before,
                };
                let (predicate, slot) = self.predicate(&where_columns, image)?;

                Ok(RowStatement {
                    op: OperationType::Update,
                    sql: format!("update {} set {} where {}", self.table, assignments.join(","), predicate),
                    slot,
                })
            })
            .collect()
    }

    pub fn delete(&self, data: &DeleteRowsData, mode: RowBatchMode) -> Result<Vec<RowStatement>> {
        let columns = self.columns(&data.columns_present)?;

        select_rows(&data.rows, mode)
            .iter()
            .map(|row| {
                check_row_width(row, columns.len())?;
                let (predicate, slot) = self.predicate(&columns, row)?;
                Ok(RowStatement {
                    op: OperationType::Delete,
                    sql: format!("delete from {} where {}", self.table, predicate),
                    slot,
                })
            })
            .collect()
    }

    /// WHERE 절 생성. slot은 이 과정에서 관찰
    fn predicate(&self, columns: &[&ColumnDef], row: &[CellValue]) -> Result<(String, Option<i64>)> {
        let mut slot = None;
        let mut terms = Vec::with_capacity(columns.len());
        for (i, column) in columns.iter().enumerate() {
            let value = cell(row, i)?;
            if let Some(s) = capture_slot(column, value)? {
                slot = Some(s);
            }
            terms.push(match value {
                CellValue::Null => format!("{} is null", column.name),
                _ => format!("{}={}", column.name, self.codec.encode(value, &column.data_type)),
            });
        }
        Ok((terms.join(" and "), slot))
    }
}

fn select_rows<T>(rows: &[T], mode: RowBatchMode) -> &[T] {
    match mode {
        RowBatchMode::FirstRow => &rows[..rows.len().min(1)],
        RowBatchMode::AllRows => rows,
    }
}

fn cell(row: &[CellValue], index: usize) -> Result<&CellValue> {
    row.get(index).ok_or_else(|| {
        CdcError::TranslationError(format!("Row has no value at index {} ({} values)", index, row.len()))
    })
}

fn check_row_width(row: &[CellValue], expected: usize) -> Result<()> {
    if row.len() != expected {
        return Err(CdcError::TranslationError(format!(
            "Row has {} values but {} columns are included",
            row.len(),
            expected
        )));
    }
    Ok(())
}

fn capture_slot(column: &ColumnDef, value: &CellValue) -> Result<Option<i64>> {
    if !column.name.eq_ignore_ascii_case(SLOT_COLUMN) || matches!(value, CellValue::Null) {
        return Ok(None);
    }
    value
        .as_slot()
        .map(Some)
        .ok_or_else(|| CdcError::InvalidSlot(format!("{:?}", value)))
}

/// 패스스루 문장의 대상 테이블
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub schema: Option<String>,
    pub table: String,
}

fn target_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?ix)
            ^\s*
            (?:
                ALTER \s+ (?:ONLINE\s+|IGNORE\s+)? TABLE
              | CREATE \s+ (?:TEMPORARY\s+)? TABLE (?:\s+IF\s+NOT\s+EXISTS)?
              | DROP \s+ (?:TEMPORARY\s+)? TABLE (?:\s+IF\s+EXISTS)?
              | TRUNCATE (?:\s+TABLE)?
              | RENAME \s+ TABLE
              | CREATE \s+ (?:UNIQUE\s+|FULLTEXT\s+|SPATIAL\s+)? INDEX \s+ \S+ \s+ ON
              | DROP \s+ INDEX \s+ \S+ \s+ ON
              | (?:INSERT|REPLACE) (?:\s+(?:LOW_PRIORITY|DELAYED|HIGH_PRIORITY|IGNORE))* (?:\s+INTO)?
              | UPDATE (?:\s+(?:LOW_PRIORITY|IGNORE))*
              | DELETE (?:\s+(?:LOW_PRIORITY|QUICK|IGNORE))* \s+ FROM
            )
            \s+
            (?:`?(?P<schema>[\w$]+)`?\.)?
            `?(?P<table>[\w$]+)`?
            ",
        )
        .expect("target pattern is valid")
    })
}

/// 패스스루 문장에서 대상 (schema, table) 추출
pub fn parse_target(sql: &str) -> Option<TableRef> {
    let caps = target_pattern().captures(sql)?;
    Some(TableRef {
        schema: caps.name("schema").map(|m| m.as_str().to_string()),
        table: caps.name("table")?.as_str().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{LiteralQuoting, SessionZone};
    use crate::schema::CatalogColumn;

    fn orders_schema() -> ColumnSchema {
        ColumnSchema::from_catalog(
            [("id", "int"), ("amount", "int"), ("_slot", "int"), ("note", "varchar")]
                .iter()
                .enumerate()
                .map(|(i, (name, ty))| CatalogColumn {
                    column_name: name.to_string(),
                    ordinal_position: i as u32 + 1,
                    data_type: ty.to_string(),
                    character_set_name: None,
                })
                .collect(),
        )
    }

    fn codec() -> ValueCodec {
        ValueCodec::new(SessionZone::System, LiteralQuoting::Verbatim)
    }

    fn row(values: &[i64]) -> Vec<CellValue> {
        values.iter().map(|v| CellValue::Int(*v)).collect()
    }

    #[test]
    fn test_insert_multi_row() {
        let schema = orders_schema();
        let codec = codec();
        let builder = StatementBuilder::new("orders", &schema, &codec);
        let data = WriteRowsData {
            table_id: 7,
            columns_present: ColumnBitmap::from_positions(&[0, 1, 2]),
            rows: vec![row(&[42, 100, 5]), row(&[43, 200, 6])],
        };

        let stmt = builder.insert(&data).unwrap().unwrap();
        assert_eq!(
            stmt.sql,
            "insert into orders(id,amount,_slot) values (42,100,5),(43,200,6)"
        );
        assert_eq!(stmt.slot, Some(6));
    }

    #[test]
    fn test_insert_rejects_unknown_column() {
        let schema = orders_schema();
        let codec = codec();
        let builder = StatementBuilder::new("orders", &schema, &codec);
        let data = WriteRowsData {
            table_id: 7,
            columns_present: ColumnBitmap::from_positions(&[0, 9]),
            rows: vec![row(&[1, 2])],
        };
        assert!(matches!(builder.insert(&data), Err(CdcError::TranslationError(_))));
    }

    #[test]
    fn test_insert_rejects_malformed_slot() {
        let schema = orders_schema();
        let codec = codec();
        let builder = StatementBuilder::new("orders", &schema, &codec);
        let data = WriteRowsData {
            table_id: 7,
            columns_present: ColumnBitmap::from_positions(&[0, 2]),
            rows: vec![vec![CellValue::Int(1), CellValue::String("x".to_string())]],
        };
        assert!(matches!(builder.insert(&data), Err(CdcError::InvalidSlot(_))));
    }

    #[test]
    fn test_update_first_row_after_image() {
        let schema = orders_schema();
        let codec = codec();
        let builder = StatementBuilder::new("orders", &schema, &codec);
        let bitmap = ColumnBitmap::from_positions(&[0, 1, 2]);
        let data = UpdateRowsData {
            table_id: 7,
            columns_before: bitmap.clone(),
            columns_after: bitmap,
            rows: vec![
                (row(&[42, 100, 5]), row(&[42, 150, 5])),
                (row(&[43, 100, 6]), row(&[43, 150, 6])),
            ],
        };

        let stmts = builder
            .update(&data, RowBatchMode::FirstRow, UpdateWhereImage::After)
            .unwrap();
        assert_eq!(stmts.len(), 1);
        assert_eq!(
            stmts[0].sql,
            "update orders set id=42,amount=150,_slot=5 where id=42 and amount=150 and _slot=5"
        );
        assert_eq!(stmts[0].slot, Some(5));

        let stmts = builder
            .update(&data, RowBatchMode::AllRows, UpdateWhereImage::Before)
            .unwrap();
        assert_eq!(stmts.len(), 2);
        assert!(stmts[1].sql.ends_with("where id=43 and amount=100 and _slot=6"));
    }

    #[test]
    fn test_update_rejects_row_wider_than_bitmap() {
        let schema = orders_schema();
        let codec = codec();
        let builder = StatementBuilder::new("orders", &schema, &codec);
        let bitmap = ColumnBitmap::from_positions(&[0, 2]);
        let data = UpdateRowsData {
            table_id: 7,
            columns_before: bitmap.clone(),
            columns_after: bitmap,
            rows: vec![(row(&[42, 100, 5]), row(&[42, 150, 5]))],
        };

        let result = builder.update(&data, RowBatchMode::FirstRow, UpdateWhereImage::After);
        assert!(matches!(result, Err(CdcError::TranslationError(_))));
    }

    #[test]
    fn test_update_after_image_needs_matching_bitmaps() {
        let schema = orders_schema();
        let codec = codec();
        let builder = StatementBuilder::new("orders", &schema, &codec);
        let data = UpdateRowsData {
            table_id: 7,
            columns_before: ColumnBitmap::from_positions(&[0, 1, 2]),
            columns_after: ColumnBitmap::from_positions(&[1, 2]),
            rows: vec![(row(&[42, 100, 5]), row(&[150, 5]))],
        };

        let result = builder.update(&data, RowBatchMode::FirstRow, UpdateWhereImage::After);
        assert!(matches!(result, Err(CdcError::TranslationError(_))));

        let stmts = builder
            .update(&data, RowBatchMode::FirstRow, UpdateWhereImage::Before)
            .unwrap();
        assert_eq!(
            stmts[0].sql,
            "update orders set amount=150,_slot=5 where id=42 and amount=100 and _slot=5"
        );
    }

    #[test]
    fn test_delete_with_null() {
        let schema = orders_schema();
        let codec = codec();
        let builder = StatementBuilder::new("orders", &schema, &codec);
        let data = DeleteRowsData {
            table_id: 7,
            columns_present: ColumnBitmap::from_positions(&[0, 2, 3]),
            rows: vec![vec![CellValue::Int(42), CellValue::UInt(5), CellValue::Null]],
        };

        let stmts = builder.delete(&data, RowBatchMode::FirstRow).unwrap();
        assert_eq!(stmts[0].sql, "delete from orders where id=42 and _slot=5 and note is null");
        assert_eq!(stmts[0].slot, Some(5));
    }

    #[test]
    fn test_empty_rows_produce_nothing() {
        let schema = orders_schema();
        let codec = codec();
        let builder = StatementBuilder::new("orders", &schema, &codec);
        let data = DeleteRowsData {
            table_id: 7,
            columns_present: ColumnBitmap::from_positions(&[0]),
            rows: vec![],
        };
        assert!(builder.delete(&data, RowBatchMode::FirstRow).unwrap().is_empty());
    }

    #[test]
    fn test_parse_target() {
        let target = parse_target("ALTER TABLE orders ADD COLUMN x INT").unwrap();
        assert_eq!(target, TableRef { schema: None, table: "orders".to_string() });

        let target = parse_target("create table if not exists `mydb`.`orders` (id int)").unwrap();
        assert_eq!(target.schema.as_deref(), Some("mydb"));
        assert_eq!(target.table, "orders");

        assert_eq!(parse_target("insert into orders values (1)").unwrap().table, "orders");
        assert_eq!(parse_target("DELETE FROM orders WHERE id=1").unwrap().table, "orders");
        assert_eq!(parse_target("truncate orders").unwrap().table, "orders");
        assert_eq!(parse_target("CREATE INDEX idx_a ON orders (a)").unwrap().table, "orders");
        assert!(parse_target("COMMIT").is_none());
        assert!(parse_target("SET @a = 1").is_none());
    }
}

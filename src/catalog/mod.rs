use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use thiserror::Error;

use crate::file::TableId;
use crate::record::{FieldType, HeapFile, RecordError, TupleDesc};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Record error: {0}")]
    RecordError(#[from] RecordError),

    #[error("Table {0} not found")]
    TableNotFound(String),

    #[error("Table id {0} not found")]
    TableIdNotFound(TableId),

    #[error("Invalid catalog entry: {0}")]
    InvalidEntry(String),

    #[error("Unknown type {0}")]
    UnknownType(String),

    #[error("Unknown annotation {0}")]
    UnknownAnnotation(String),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: String, // "INT" or "STRING(n)"
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableMetadata {
    pub id: u32,
    pub name: String,
    pub file: PathBuf,
    pub columns: Vec<ColumnMetadata>,
    pub primary_key: Option<String>,
}

impl TableMetadata {
    fn tuple_desc(&self) -> CatalogResult<TupleDesc> {
        let items = self
            .columns
            .iter()
            .map(|c| {
                FieldType::parse(&c.column_type, 0)
                    .map(|t| (t, c.name.clone()))
                    .ok_or_else(|| CatalogError::UnknownType(c.column_type.clone()))
            })
            .collect::<CatalogResult<Vec<_>>>()?;
        Ok(TupleDesc::new(items))
    }
}

/// On-disk form of the catalog
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogMetadata {
    pub tables: Vec<TableMetadata>,
}

struct TableEntry {
    name: String,
    file: Arc<HeapFile>,
    primary_key: Option<String>,
}

#[derive(Default)]
struct Tables {
    by_id: BTreeMap<TableId, TableEntry>,
    by_name: HashMap<String, TableId>,
}

/// Registry of the tables in the database and the heap files backing them
pub struct Catalog {
    tables: RwLock<Tables>,
    next_id: AtomicU32,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            next_id: AtomicU32::new(1),
        }
    }

    /// Reserve a fresh table id
    pub fn next_table_id(&self) -> TableId {
        TableId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Register `file` as table `name`
    ///
    /// A table already registered under the same name or the same id is
    /// replaced.
    pub fn add_table(&self, file: Arc<HeapFile>, name: &str, primary_key: Option<&str>) {
        let id = file.id();
        self.next_id.fetch_max(id.0 + 1, Ordering::Relaxed);

        let mut tables = self.tables.write();
        if let Some(old_id) = tables.by_name.remove(name) {
            tables.by_id.remove(&old_id);
        }
        if let Some(old) = tables.by_id.remove(&id) {
            tables.by_name.remove(&old.name);
        }

        tables.by_name.insert(name.to_string(), id);
        tables.by_id.insert(
            id,
            TableEntry {
                name: name.to_string(),
                file,
                primary_key: primary_key.map(str::to_string),
            },
        );
    }

    pub fn table_id(&self, name: &str) -> CatalogResult<TableId> {
        self.tables
            .read()
            .by_name
            .get(name)
            .copied()
            .ok_or_else(|| CatalogError::TableNotFound(name.to_string()))
    }

    fn with_entry<T>(&self, id: TableId, f: impl FnOnce(&TableEntry) -> T) -> CatalogResult<T> {
        self.tables
            .read()
            .by_id
            .get(&id)
            .map(f)
            .ok_or(CatalogError::TableIdNotFound(id))
    }

    pub fn tuple_desc(&self, id: TableId) -> CatalogResult<Arc<TupleDesc>> {
        self.with_entry(id, |e| Arc::clone(e.file.tuple_desc()))
    }

    pub fn file(&self, id: TableId) -> CatalogResult<Arc<HeapFile>> {
        self.with_entry(id, |e| Arc::clone(&e.file))
    }

    pub fn primary_key(&self, id: TableId) -> CatalogResult<Option<String>> {
        self.with_entry(id, |e| e.primary_key.clone())
    }

    pub fn table_name(&self, id: TableId) -> CatalogResult<String> {
        self.with_entry(id, |e| e.name.clone())
    }

    /// Ids of all registered tables, ascending
    pub fn table_ids(&self) -> Vec<TableId> {
        self.tables.read().by_id.keys().copied().collect()
    }

    pub fn clear(&self) {
        let mut tables = self.tables.write();
        tables.by_id.clear();
        tables.by_name.clear();
    }

    /// Register the tables listed in a text schema file
    ///
    /// Each line reads `name (field type [pk], ...)` with types `int`,
    /// `string` or `string(n)`. Table `name` is stored in `name.dat` next to
    /// the schema file.
    pub fn load_schema<P: AsRef<Path>>(
        &self,
        path: P,
        page_size: usize,
        string_len: usize,
    ) -> CatalogResult<Vec<TableId>> {
        let path = path.as_ref();
        let base = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let content = fs::read_to_string(path)?;

        let mut added = Vec::new();
        for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let (name, desc, primary_key) = parse_schema_line(line, string_len)?;
            let file = HeapFile::open(
                self.next_table_id(),
                base.join(format!("{}.dat", name)),
                Arc::new(desc),
                page_size,
            )?;
            let id = file.id();
            self.add_table(Arc::new(file), &name, primary_key.as_deref());
            added.push(id);
        }

        Ok(added)
    }

    /// Snapshot of every table's metadata, ordered by id
    pub fn metadata(&self) -> CatalogMetadata {
        let tables = self.tables.read();
        CatalogMetadata {
            tables: tables
                .by_id
                .iter()
                .map(|(id, entry)| TableMetadata {
                    id: id.0,
                    name: entry.name.clone(),
                    file: entry.file.path().to_path_buf(),
                    columns: entry
                        .file
                        .tuple_desc()
                        .items()
                        .iter()
                        .map(|item| ColumnMetadata {
                            name: item.name.clone(),
                            column_type: item.field_type.to_string(),
                        })
                        .collect(),
                    primary_key: entry.primary_key.clone(),
                })
                .collect(),
        }
    }

    pub fn save_metadata<P: AsRef<Path>>(&self, path: P) -> CatalogResult<()> {
        let content = serde_json::to_string_pretty(&self.metadata())?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Register every table recorded in a metadata file, keeping their ids
    pub fn load_metadata<P: AsRef<Path>>(&self, path: P, page_size: usize) -> CatalogResult<Vec<TableId>> {
        let content = fs::read_to_string(path)?;
        let metadata: CatalogMetadata = serde_json::from_str(&content)?;

        let mut added = Vec::with_capacity(metadata.tables.len());
        for table in &metadata.tables {
            let id = TableId(table.id);
            let file = HeapFile::open(id, &table.file, Arc::new(table.tuple_desc()?), page_size)?;
            self.add_table(Arc::new(file), &table.name, table.primary_key.as_deref());
            added.push(id);
        }

        Ok(added)
    }
}

/// Parse `name (field type [pk], ...)`
fn parse_schema_line(line: &str, string_len: usize) -> CatalogResult<(String, TupleDesc, Option<String>)> {
    let invalid = || CatalogError::InvalidEntry(line.to_string());

    let open = line.find('(').ok_or_else(invalid)?;
    let close = line.rfind(')').ok_or_else(invalid)?;
    if close < open {
        return Err(invalid());
    }

    let name = line[..open].trim();
    if name.is_empty() {
        return Err(invalid());
    }

    let mut items = Vec::new();
    let mut primary_key = None;
    for column in line[open + 1..close].split(',') {
        let parts: Vec<&str> = column.split_whitespace().collect();
        let (field, type_name) = match parts.as_slice() {
            [field, type_name] | [field, type_name, _] => (*field, *type_name),
            _ => return Err(invalid()),
        };

        let field_type = FieldType::parse(type_name, string_len)
            .ok_or_else(|| CatalogError::UnknownType(type_name.to_string()))?;

        if let [_, _, annotation] = parts.as_slice() {
            if *annotation != "pk" {
                return Err(CatalogError::UnknownAnnotation(annotation.to_string()));
            }
            primary_key = Some(field.to_string());
        }

        items.push((field_type, field.to_string()));
    }

    Ok((name.to_string(), TupleDesc::new(items), primary_key))
}

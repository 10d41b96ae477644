//! LanceDB connection helpers.
use anyhow::{Context, Result};
use lancedb::{connect, Connection, Table};
use std::path::Path;

use crate::schema::TABLE_NAME;

pub async fn open_db(dir: &Path) -> Result<Connection> {
	Ok(connect(dir.to_string_lossy().as_ref()).execute().await?)
}

/// Opens the embeddings table, failing if the database has none.
pub async fn open_embeddings(conn: &Connection) -> Result<Table> {
	let names = conn.table_names().execute().await?;
	if !names.iter().any(|n| n == TABLE_NAME) {
		anyhow::bail!("no '{TABLE_NAME}' table in {}", conn.uri());
	}
	conn.open_table(TABLE_NAME).execute().await.with_context(|| format!("opening table '{TABLE_NAME}'"))
}

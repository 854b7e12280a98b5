//! In-memory scripted connection for unit tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::core::{Connection, Row};
use crate::dialect::Backend;
use crate::error::{LoadError, Result};
use crate::ingest::InsertStatement;

/// One call received by a [`ScriptedConnection`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Execute(String),
    Batch(Vec<Row>),
    Row(Row),
    Commit,
    Rollback,
    Close,
}

#[derive(Debug, Default)]
struct State {
    events: Vec<Event>,
    pending: Vec<Row>,
    committed: Vec<Row>,
    aborted: bool,
}

type Reject = Box<dyn Fn(&[String]) -> bool + Send + Sync>;

/// Records every call and keeps a pending/committed view of inserted rows.
///
/// Rows matching the reject predicate fail. A failed batch keeps the rows
/// before the offending one pending, as a real multi-row insert would.
/// Backends that invalidate the transaction after an error refuse every
/// statement until the next rollback.
pub struct ScriptedConnection {
    backend: Backend,
    state: Arc<Mutex<State>>,
    reject: Reject,
    lose_connection_on_batch: bool,
}

/// Shared view of a connection moved into a loader.
#[derive(Clone)]
pub struct Journal(Arc<Mutex<State>>);

impl Journal {
    pub fn events(&self) -> Vec<Event> {
        self.0.lock().unwrap().events.clone()
    }

    pub fn committed(&self) -> Vec<Row> {
        self.0.lock().unwrap().committed.clone()
    }
}

impl ScriptedConnection {
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            state: Arc::default(),
            reject: Box::new(|_| false),
            lose_connection_on_batch: false,
        }
    }

    pub fn rejecting<F>(mut self, reject: F) -> Self
    where
        F: Fn(&[String]) -> bool + Send + Sync + 'static,
    {
        self.reject = Box::new(reject);
        self
    }

    pub fn losing_connection(mut self) -> Self {
        self.lose_connection_on_batch = true;
        self
    }

    pub fn journal(&self) -> Journal {
        Journal(Arc::clone(&self.state))
    }

    pub fn events(&self) -> Vec<Event> {
        self.journal().events()
    }

    pub fn committed(&self) -> Vec<Row> {
        self.journal().committed()
    }

    fn guard(&self, state: &State) -> Result<()> {
        if state.aborted {
            return Err(LoadError::database(
                self.backend.name(),
                "current transaction is aborted, commands ignored until end of transaction block",
            ));
        }
        Ok(())
    }

    fn fail(&self, state: &mut State, row: &[String]) -> LoadError {
        if self.backend.dialect().must_rollback_after_error {
            state.aborted = true;
        }
        LoadError::database(self.backend.name(), format!("rejected row {:?}", row))
    }
}

#[async_trait]
impl Connection for ScriptedConnection {
    fn backend(&self) -> Backend {
        self.backend
    }

    async fn execute(&mut self, sql: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.events.push(Event::Execute(sql.to_string()));
        self.guard(&state)
    }

    async fn execute_batch(&mut self, _stmt: &InsertStatement, rows: &[Row]) -> Result<u64> {
        if self.lose_connection_on_batch {
            return Err(LoadError::Connection("server closed the connection".into()));
        }
        let mut state = self.state.lock().unwrap();
        state.events.push(Event::Batch(rows.to_vec()));
        self.guard(&state)?;
        for row in rows {
            if (self.reject)(row) {
                return Err(self.fail(&mut state, row));
            }
            state.pending.push(row.clone());
        }
        Ok(rows.len() as u64)
    }

    async fn execute_row(&mut self, _stmt: &InsertStatement, row: &[String]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.events.push(Event::Row(row.to_vec()));
        self.guard(&state)?;
        if (self.reject)(row) {
            return Err(self.fail(&mut state, row));
        }
        state.pending.push(row.to_vec());
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.events.push(Event::Commit);
        if state.aborted {
            // COMMIT of a failed transaction rolls it back.
            state.pending.clear();
            state.aborted = false;
            return Ok(());
        }
        let pending = std::mem::take(&mut state.pending);
        state.committed.extend(pending);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.events.push(Event::Rollback);
        state.pending.clear();
        state.aborted = false;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.events.push(Event::Close);
        state.pending.clear();
        Ok(())
    }
}

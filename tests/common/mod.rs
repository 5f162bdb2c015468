#![allow(dead_code)]

use entity_registry::notify::Broker;
use entity_registry::prelude::*;
use entity_registry::{DatabaseBuilder, RegistryConfig};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

lazy_static! {
    static ref BRANCH_SCHEMA: TableSchema = TableSchema::new("branches")
        .column(Column::new("name", DataType::Text).not_null())
        .column(Column::new("code", DataType::Text))
        .has_many("banks", "banks", "branch_id");
    static ref BANK_SCHEMA: TableSchema = TableSchema::new("banks")
        .column(Column::new("name", DataType::Text).not_null())
        .column(Column::new("branch_id", DataType::Uuid))
        .column(Column::new("rating", DataType::Integer))
        .belongs_to("branch", "branches", "branch_id");
    static ref LEDGER_SCHEMA: TableSchema = TableSchema::new("ledgers")
        .column(Column::new("account", DataType::Text).not_null())
        .column(Column::new("print_number", DataType::Integer));
}

// ----------------------------------------------------------------------------
// Branch
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Branch {
    pub audit: AuditFields,
    pub name: String,
    pub code: Option<String>,
    pub banks: Vec<Bank>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BranchResponse {
    pub id: Uuid,
    pub name: String,
    pub banks: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BranchRequest {
    pub name: String,
    pub code: Option<String>,
}

impl Branch {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }
}

impl Entity for Branch {
    type Response = BranchResponse;
    type Request = BranchRequest;

    fn schema() -> &'static TableSchema {
        &BRANCH_SCHEMA
    }

    fn audit(&self) -> &AuditFields {
        &self.audit
    }

    fn audit_mut(&mut self) -> &mut AuditFields {
        &mut self.audit
    }

    fn to_row(&self) -> Row {
        let mut row = Row::new()
            .with("name", self.name.clone())
            .with("code", self.code.clone());
        self.audit.write_to(&mut row);
        row
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            audit: AuditFields::from_row(row)?,
            name: row.text("name")?,
            code: row.opt_text("code")?,
            banks: Vec::new(),
        })
    }

    fn attach(&mut self, relation: &str, rows: Vec<Row>) -> Result<()> {
        match relation {
            "banks" => {
                self.banks = rows.iter().map(Bank::from_row).collect::<Result<_>>()?;
                Ok(())
            }
            other => Err(RegistryError::Validation(format!("no relation {}", other))),
        }
    }
}

pub fn branch_response(branch: &Branch) -> BranchResponse {
    BranchResponse {
        id: branch.audit.id,
        name: branch.name.clone(),
        banks: branch.banks.iter().map(|b| b.name.clone()).collect(),
    }
}

// ----------------------------------------------------------------------------
// Bank
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bank {
    pub audit: AuditFields,
    pub name: String,
    pub branch_id: Option<Uuid>,
    pub rating: i64,
    pub branch: Option<Box<Branch>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BankResponse {
    pub id: Uuid,
    pub name: String,
    pub rating: i64,
    pub branch_id: Option<Uuid>,
    pub branch_name: Option<String>,
    pub deleted: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BankRequest {
    pub name: String,
    pub branch_id: Option<Uuid>,
    #[serde(default)]
    pub rating: i64,
}

impl Bank {
    pub fn new(name: &str, branch_id: Option<Uuid>, rating: i64) -> Self {
        Self {
            name: name.to_string(),
            branch_id,
            rating,
            ..Default::default()
        }
    }
}

impl Entity for Bank {
    type Response = BankResponse;
    type Request = BankRequest;

    fn schema() -> &'static TableSchema {
        &BANK_SCHEMA
    }

    fn audit(&self) -> &AuditFields {
        &self.audit
    }

    fn audit_mut(&mut self) -> &mut AuditFields {
        &mut self.audit
    }

    fn to_row(&self) -> Row {
        let mut row = Row::new()
            .with("name", self.name.clone())
            .with("branch_id", self.branch_id)
            .with("rating", self.rating);
        self.audit.write_to(&mut row);
        row
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            audit: AuditFields::from_row(row)?,
            name: row.text("name")?,
            branch_id: row.opt_uuid("branch_id")?,
            rating: row.opt_i64("rating")?.unwrap_or_default(),
            branch: None,
        })
    }

    fn attach(&mut self, relation: &str, rows: Vec<Row>) -> Result<()> {
        match relation {
            "branch" => {
                self.branch = rows
                    .first()
                    .map(Branch::from_row)
                    .transpose()?
                    .map(Box::new);
                Ok(())
            }
            other => Err(RegistryError::Validation(format!("no relation {}", other))),
        }
    }
}

pub fn bank_response(bank: &Bank) -> BankResponse {
    BankResponse {
        id: bank.audit.id,
        name: bank.name.clone(),
        rating: bank.rating,
        branch_id: bank.branch_id,
        branch_name: bank.branch.as_ref().map(|b| b.name.clone()),
        deleted: bank.audit.is_deleted(),
    }
}

// ----------------------------------------------------------------------------
// Ledger
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Ledger {
    pub audit: AuditFields,
    pub account: String,
    pub print_number: i64,
}

impl Ledger {
    pub fn new(account: &str, print_number: i64) -> Self {
        Self {
            account: account.to_string(),
            print_number,
            ..Default::default()
        }
    }
}

impl Entity for Ledger {
    type Response = Ledger;
    type Request = serde_json::Value;

    fn schema() -> &'static TableSchema {
        &LEDGER_SCHEMA
    }

    fn audit(&self) -> &AuditFields {
        &self.audit
    }

    fn audit_mut(&mut self) -> &mut AuditFields {
        &mut self.audit
    }

    fn to_row(&self) -> Row {
        let mut row = Row::new()
            .with("account", self.account.clone())
            .with("print_number", self.print_number);
        self.audit.write_to(&mut row);
        row
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            audit: AuditFields::from_row(row)?,
            account: row.text("account")?,
            print_number: row.opt_i64("print_number")?.unwrap_or_default(),
        })
    }
}

// ----------------------------------------------------------------------------
// Fixture
// ----------------------------------------------------------------------------

pub struct Fixture {
    pub db: Database,
    pub broker: Arc<MemoryBroker>,
    pub branches: Arc<Registry<Branch>>,
    pub banks: Arc<Registry<Bank>>,
    pub ledgers: Arc<Registry<Ledger>>,
}

pub async fn fixture() -> Fixture {
    fixture_with(RegistryConfig::default()).await
}

pub async fn fixture_with(config: RegistryConfig) -> Fixture {
    let broker = Arc::new(MemoryBroker::default());
    let db = Database::builder()
        .config(config)
        .broker(broker.clone())
        .build()
        .unwrap();
    registries(db, broker).await
}

/// Registries over a database that publishes to `broker`.
pub async fn fixture_with_broker(broker: Arc<dyn Broker>) -> Fixture {
    let db = DatabaseBuilder::default().broker(broker).build().unwrap();
    registries(db, Arc::new(MemoryBroker::default())).await
}

async fn registries(db: Database, broker: Arc<MemoryBroker>) -> Fixture {
    let branches = Registry::<Branch>::new(
        RegistryParams::new(db.clone(), branch_response)
            .topics(TopicScheme::new("branch")),
    )
    .await
    .unwrap();
    let banks = Registry::<Bank>::new(
        RegistryParams::new(db.clone(), bank_response)
            .preloads(["branch"])
            .topics(TopicScheme::new("bank").scope("branch", |b: &Bank| b.branch_id)),
    )
    .await
    .unwrap();
    let ledgers = Registry::<Ledger>::new(RegistryParams::new(db.clone(), |l: &Ledger| l.clone()))
        .await
        .unwrap();

    Fixture {
        db,
        broker,
        branches: Arc::new(branches),
        banks: Arc::new(banks),
        ledgers: Arc::new(ledgers),
    }
}

pub fn no_filter() -> Filter {
    Filter::all()
}

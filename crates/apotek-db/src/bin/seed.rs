//! # Seed Data Generator
//!
//! Populates the database with the catalog rows a prescription needs.
//!
//! ## Usage
//! ```bash
//! # Seed ./data/apotek.db with admin/admin
//! cargo run -p apotek-db --bin seed
//!
//! # Specify database path and admin password
//! cargo run -p apotek-db --bin seed -- --db ./data/apotek.db --password s3cret
//! ```
//!
//! ## Generated Rows
//! - Users `admin` (administrator) and `apoteker` (clerk)
//! - Customer `ACME` with one invoice per day for the last week
//! - Units `tab`, `strip`, `box`, `cap`, `botol`
//! - Medicines with one to three units each

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use std::env;

use apotek_db::password::hash_password;
use apotek_db::{CatalogRepository, Database, DbConfig, NewMedicine};

/// (barcode, name, stock in first unit, first unit, second unit + ratio, third unit + ratio)
type MedicineSeed = (
    &'static str,
    &'static str,
    f64,
    &'static str,
    Option<(&'static str, f64)>,
    Option<(&'static str, f64)>,
);

const MEDICINES: &[MedicineSeed] = &[
    ("BX1", "Amoxicillin 500mg", 500.0, "tab", Some(("strip", 10.0)), Some(("box", 100.0))),
    ("BX2", "Paracetamol 500mg", 1000.0, "tab", Some(("strip", 10.0)), Some(("box", 100.0))),
    ("BX3", "CTM 4mg", 300.0, "tab", Some(("strip", 10.0)), None),
    ("BX4", "Ambroxol 30mg", 200.0, "tab", Some(("strip", 10.0)), None),
    ("BX5", "OBH Syrup 100ml", 40.0, "botol", None, None),
    ("BX6", "Omeprazole 20mg", 120.0, "cap", Some(("strip", 10.0)), Some(("box", 30.0))),
];

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    let mut db_path = String::from("./data/apotek.db");
    let mut password = String::from("admin");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--password" | "-p" => {
                if i + 1 < args.len() {
                    password = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Apotek Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>          Database file path (default: ./data/apotek.db)");
                println!("  -p, --password <PASS>    Password for both seeded users (default: admin)");
                println!("  -h, --help               Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Apotek Seed Data Generator");
    println!("=============================");
    println!("Database: {}", db_path);
    println!();

    if let Some(parent) = std::path::Path::new(&db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
    }

    let db = Database::new(DbConfig::new(&db_path)).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let mut tx = db.begin().await?;
    let mut catalog = CatalogRepository::new(&mut tx);

    if catalog.get_credentials("admin").await?.is_some() {
        println!("⚠ Database already has an admin user");
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    let hash = hash_password(&password)?;
    let admin = catalog.create_user("admin", &hash, true).await?;
    catalog.create_user("apoteker", &hash, false).await?;
    println!("✓ Users: admin, apoteker");

    let customer = catalog.create_customer("ACME").await?;
    let today = Utc::now();
    for day in 0..7 {
        catalog
            .create_invoice(100 + day, customer, today - Duration::days(day), 0.0, Some(admin.id))
            .await?;
    }
    println!("✓ Customer ACME with invoices 100..106 (today back to 6 days ago)");

    for (barcode, name, qty, first, second, third) in MEDICINES {
        let first_unit_id = catalog.get_or_create_unit(first).await?;

        let second_unit = match second {
            Some((unit, ratio)) => Some((catalog.get_or_create_unit(unit).await?, *ratio)),
            None => None,
        };
        let third_unit = match third {
            Some((unit, ratio)) => Some((catalog.get_or_create_unit(unit).await?, *ratio)),
            None => None,
        };

        catalog
            .create_medicine(&NewMedicine {
                barcode: barcode.to_string(),
                name: name.to_string(),
                qty: *qty,
                first_unit_id,
                second_unit,
                third_unit,
            })
            .await?;
    }
    println!("✓ {} medicines", MEDICINES.len());

    tx.commit().await?;

    println!();
    println!("🎉 Seed complete. Log in with admin / {}", password);

    Ok(())
}

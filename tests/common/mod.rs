#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

use basket_recommender::db::TablePaths;

pub const PRODUCTS_HEADER: &str =
    "product_id,product_name,product_category,is_discounted,in_stock,price";
pub const TRANSACTIONS_HEADER: &str =
    "customer_id,product_id,date_of_transaction,quantity,product_category";
pub const INTERACTIONS_HEADER: &str =
    "customer_id,session_id,event_id,event_timestamp,event_type,page_category,device_type,product_id";

/// Evaluation instant the fixture dates are written against
pub fn evaluated_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

/// Three CSV tables in a temporary directory
pub struct Fixture {
    pub dir: TempDir,
    pub paths: TablePaths,
}

impl Fixture {
    pub fn new(products: &[&str], transactions: &[&str], interactions: &[&str]) -> Self {
        let dir = TempDir::new().unwrap();
        let paths = TablePaths {
            products: write_table(&dir, "products.csv", PRODUCTS_HEADER, products),
            transactions: write_table(&dir, "transactions.csv", TRANSACTIONS_HEADER, transactions),
            interactions: write_table(&dir, "interactions.csv", INTERACTIONS_HEADER, interactions),
        };
        Self { dir, paths }
    }

    /// A small grocery store
    ///
    /// For C001 at `evaluated_at`: P001 was bought three days ago, P003 is
    /// discounted and P004 is out of stock, leaving P002, P005 and P006.
    pub fn grocery() -> Self {
        Self::new(
            &[
                "P001,Carrots,produce,false,true,0.99",
                "P002,Milk,dairy,false,true,1.49",
                "P003,Bread,bakery,true,true,2.10",
                "P004,Apples,produce,false,false,3.20",
                "P005,Yogurt,dairy,false,true,0.89",
                "P006,Cheese,dairy,false,true,4.50",
            ],
            &[
                "C001,P001,2024-05-29,1,produce",
                "C001,P002,2024-05-10,2,dairy",
                "C001,P002,2024-05-17,1,dairy",
                "C002,P005,2024-04-01,3,dairy",
                "C002,P002,2024-04-20,1,dairy",
            ],
            &[
                "C001,S1,E1,2024-06-01 10:00:00,view,dairy,mobile,P006",
                "C001,S1,E2,2024-06-01 10:05:00,add_to_cart,dairy,mobile,P005",
                "C001,S1,E3,2024-06-01 10:06:00,search,dairy,mobile,",
            ],
        )
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

fn write_table(dir: &TempDir, name: &str, header: &str, rows: &[&str]) -> PathBuf {
    let path = dir.path().join(name);
    let mut contents = String::from(header);
    contents.push('\n');
    for row in rows {
        contents.push_str(row);
        contents.push('\n');
    }
    fs::write(&path, contents).unwrap();
    path
}

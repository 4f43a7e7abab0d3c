use std::error::Error;
use std::fs;
use std::path::Path;

use assert_cmd::Command;
use serde_json::Value;
use tempfile::TempDir;

type TestResult = Result<(), Box<dyn Error>>;

fn workspace() -> Result<TempDir, Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let data = dir.path().join("data");
    fs::create_dir(&data)?;
    fs::write(
        data.join("users.csv"),
        "user_id,name,email,created_at\n1,Alice,alice@example.com,2024-01-01\n2,Bob,bob@example.com,2024-01-01\n",
    )?;
    fs::write(
        data.join("items.csv"),
        "item_id,name,price,category,description\n1,Burger,8.0,Mains,\n2,Fries,3.0,Sides,\n3,Cola,2.0,Drinks,\n",
    )?;
    fs::write(
        data.join("orders.csv"),
        "order_id,user_id,created_at,total_amount\n1,1,2024-03-01,11.0\n2,1,2024-03-02,13.0\n3,2,2024-03-03,10.0\n",
    )?;
    fs::write(
        data.join("order_items.csv"),
        "order_id,item_id,quantity\n1,1,1\n1,2,1\n2,1,1\n2,3,1\n3,1,1\n3,2,1\n",
    )?;
    Ok(dir)
}

fn menugraph(dir: &Path) -> Result<Command, Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("menugraph")?;
    cmd.env("XDG_CONFIG_HOME", dir)
        .env_remove("MENUGRAPH_DB")
        .env_remove("APP_PORT")
        .env_remove("MENUGRAPH_PORT")
        .env_remove("RUST_LOG")
        .arg("--db")
        .arg(dir.join("graph.db"))
        .arg("--log-level")
        .arg("warn");
    Ok(cmd)
}

fn json_output(cmd: &mut Command) -> Result<Value, Box<dyn Error>> {
    let output = cmd.arg("--format").arg("json").output()?;
    assert!(output.status.success(), "{output:?}");
    Ok(serde_json::from_slice(&output.stdout)?)
}

#[test]
fn import_then_recommend() -> TestResult {
    let dir = workspace()?;
    menugraph(dir.path())?
        .arg("import")
        .arg("--data-dir")
        .arg(dir.path().join("data"))
        .assert()
        .success();

    let status = json_output(menugraph(dir.path())?.arg("status"))?;
    assert_eq!(status["orders"], 3);
    assert_eq!(status["ordered_along_with"], 4);

    let frequent = json_output(menugraph(dir.path())?.args(["recommend", "frequent", "1"]))?;
    assert_eq!(frequent[0]["item"]["name"], "Burger");
    assert_eq!(frequent[0]["score"], 2.0);

    let global = json_output(menugraph(dir.path())?.args(["recommend", "global", "1"]))?;
    assert_eq!(global[0]["item"]["name"], "Fries");

    let hybrid = json_output(menugraph(dir.path())?.args([
        "recommend",
        "hybrid",
        "1",
        "--item-in-cart",
        "1",
        "--limit",
        "1",
    ]))?;
    assert_eq!(hybrid.as_array().map(Vec::len), Some(1));
    Ok(())
}

#[test]
fn recorded_order_is_applied() -> TestResult {
    let dir = workspace()?;
    menugraph(dir.path())?
        .arg("import")
        .arg("--data-dir")
        .arg(dir.path().join("data"))
        .assert()
        .success();

    menugraph(dir.path())?
        .args(["order", "--id", "9", "--user", "2", "--item", "3:2", "--item", "2", "--apply"])
        .assert()
        .success();

    let frequent = json_output(menugraph(dir.path())?.args(["recommend", "frequent", "2"]))?;
    let names: Vec<&str> = frequent
        .as_array()
        .map(|recs| recs.iter().filter_map(|r| r["item"]["name"].as_str()).collect())
        .unwrap_or_default();
    assert_eq!(names, vec!["Fries", "Cola", "Burger"]);

    let again = json_output(menugraph(dir.path())?.args(["apply-order", "9"]))?;
    assert_eq!(again["outcome"], "already_applied");
    Ok(())
}

#[test]
fn unknown_order_fails() -> TestResult {
    let dir = workspace()?;
    menugraph(dir.path())?
        .args(["apply-order", "404"])
        .assert()
        .failure();
    Ok(())
}

#[test]
fn bad_config_file_is_reported() -> TestResult {
    let dir = workspace()?;
    let config = dir.path().join("bad.toml");
    fs::write(&config, "[server\nport = 1")?;
    let output = menugraph(dir.path())?
        .arg("--config")
        .arg(&config)
        .arg("status")
        .output()?;
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("failed to parse config"));
    Ok(())
}

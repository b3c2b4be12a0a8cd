use std::env;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock};

use clap::Parser;
use serde_json::Value;

use freightq_cli::commands::CommandResult;
use freightq_cli::{execute, Cli};
use freightq_core::clock::SystemClock;
use freightq_mail::SpoolMailTransport;

const BID: &str = "SHIP-20240305-0930";

fn freightq(args: &[&str]) -> CommandResult {
    let cli = Cli::try_parse_from(std::iter::once("freightq").chain(args.iter().copied()))
        .expect("arguments should parse");
    execute(cli)
}

fn desk_env(root: &Path) -> Vec<(&'static str, String)> {
    vec![
        ("FREIGHTQ_STORAGE_DATA_DIR", root.join("data").display().to_string()),
        ("FREIGHTQ_MAIL_SPOOL_DIR", root.join("mail").display().to_string()),
        ("FREIGHTQ_CONTRACTS_TEMPLATE_DIR", root.join("templates").display().to_string()),
        ("FREIGHTQ_CONTRACTS_ARCHIVE_DIR", root.join("contracts").display().to_string()),
        ("FREIGHTQ_CONTRACTS_TRANSIENT_DIR", root.join("tmp").display().to_string()),
        ("FREIGHTQ_RATES_PROVIDER", "fixed".to_string()),
    ]
}

fn seed_carriers(root: &Path) {
    let data_dir = root.join("data");
    fs::create_dir_all(&data_dir).expect("data dir");
    fs::write(
        data_dir.join("carriers.json"),
        r#"[{"name": "Baltic Lines", "email": "quotes@baltic.test", "notes": ""}]"#,
    )
    .expect("carriers");
}

fn deliver_reply(root: &Path, sea_freight: &str) {
    let spool = SpoolMailTransport::new(root.join("mail"), "desk@freightq.test", Arc::new(SystemClock));
    let raw = format!(
        "From: \"Baltic Lines\" <quotes@baltic.test>\r\n\
         Subject: RE: Новая заявка {BID}\r\n\
         Content-Type: text/plain; charset=utf-8\r\n\
         Content-Transfer-Encoding: 8bit\r\n\
         \r\n\
         ID заявки: {BID}\r\n\
         \r\n\
         Расчет стоимости:\r\n\
         Sea freight {sea_freight} USD\r\n\
         \r\n\
         Примечания:\r\n"
    );
    spool.deliver("Inbox", raw.as_bytes()).expect("reply delivered");
}

fn submit_request() -> CommandResult {
    freightq(&[
        "submit",
        "--id",
        BID,
        "--country-from",
        "Китай",
        "--port-from",
        "Qingdao",
        "--cargo-type",
        "general",
        "--loading-address",
        "Qingdao, Huangdao district",
        "--payment-terms",
        "100% before loading",
        "--cost",
        "Sea freight=1800 USD",
    ])
}

fn outbox_messages(root: &Path) -> usize {
    fs::read_dir(root.join("mail/outbox"))
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "eml"))
                .count()
        })
        .unwrap_or(0)
}

#[test]
fn request_reply_comparison_and_contract_flow() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path();
    seed_carriers(root);
    let vars = desk_env(root);

    with_env(&vars, || {
        let result = submit_request();
        assert_eq!(result.exit_code, 0, "{}", result.output);
        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "submit");
        assert_eq!(payload["data"]["bid_id"], BID);
        assert_eq!(payload["data"]["dispatched"], 1);
        assert_eq!(outbox_messages(root), 1);

        deliver_reply(root, "1 700");
        let result = freightq(&["ingest"]);
        assert_eq!(result.exit_code, 0, "{}", result.output);
        let payload = parse_payload(&result.output);
        assert_eq!(payload["data"]["accepted"].as_array().map(Vec::len), Some(1));
        assert!(root.join("mail/Inbox/cur").read_dir().expect("read dir").next().is_some());

        let result = freightq(&["compare", "--matched-only"]);
        assert_eq!(result.exit_code, 0, "{}", result.output);
        let payload = parse_payload(&result.output);
        let rows = payload["data"]["rows"].as_array().expect("rows");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["key"]["sender_name"], "Baltic Lines");
        assert_eq!(rows[0]["best"], true);
        assert_eq!(payload["data"]["rate_origin"], "fallback");

        let result = freightq(&[
            "status", "--bid", BID, "--sender", "Baltic Lines", "--status", "Принято",
        ]);
        assert_eq!(result.exit_code, 0, "{}", result.output);
        let payload = parse_payload(&result.output);
        assert_eq!(payload["data"]["transitions"][0]["outcome"]["outcome"], "dispatched");
        assert_eq!(outbox_messages(root), 2);

        let result = freightq(&["contract", "--bid", BID, "--sender", "Baltic Lines", "--send"]);
        assert_eq!(result.exit_code, 0, "{}", result.output);
        let payload = parse_payload(&result.output);
        assert_eq!(payload["data"]["recipient"], "quotes@baltic.test");
        let archived = payload["data"]["archived_path"].as_str().expect("archived path");
        let document = fs::read_to_string(archived).expect("archived contract");
        assert!(document.contains("1700.00 USD"));
        assert_eq!(outbox_messages(root), 3);

        let result = freightq(&["bid-status", "--bid", BID, "--status", "accepted"]);
        assert_eq!(result.exit_code, 0, "{}", result.output);
        assert_eq!(parse_payload(&result.output)["data"]["previous"], "New");

        let result = freightq(&["rates"]);
        assert_eq!(result.exit_code, 0, "{}", result.output);
        assert_eq!(parse_payload(&result.output)["data"]["reference"], "RUB");

        let result = freightq(&["doctor", "--json"]);
        assert_eq!(result.exit_code, 0, "{}", result.output);
        assert_eq!(parse_payload(&result.output)["overall_status"], "pass");
    });
}

#[test]
fn carrier_list_is_managed_from_the_command_line() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path();
    let vars = desk_env(root);

    with_env(&vars, || {
        let result = freightq(&[
            "carriers", "add", "--name", "Baltic Lines", "--email", "quotes@baltic.test",
        ]);
        assert_eq!(result.exit_code, 0, "{}", result.output);
        assert_eq!(parse_payload(&result.output)["data"]["count"], 1);

        let result = freightq(&["carriers", "add", "--name", "Nowhere", "--email", "no-address"]);
        assert_eq!(result.exit_code, 4, "{}", result.output);

        let csv = root.join("carriers.csv");
        fs::write(&csv, "name,email,notes
Sea Line,ops@sealine.test,
Rail Co,rail@co.test,night
")
            .expect("csv");
        let result = freightq(&["carriers", "import", csv.to_str().expect("utf-8 path")]);
        assert_eq!(result.exit_code, 0, "{}", result.output);
        assert_eq!(parse_payload(&result.output)["data"]["count"], 2);

        let bad = root.join("bad.csv");
        fs::write(&bad, "name,email
,ops@sealine.test
").expect("csv");
        let result = freightq(&["carriers", "import", bad.to_str().expect("utf-8 path")]);
        assert_ne!(result.exit_code, 0);

        let result = freightq(&["carriers", "list"]);
        assert_eq!(result.exit_code, 0, "{}", result.output);
        let payload = parse_payload(&result.output);
        let names: Vec<&str> = payload["data"]
            .as_array()
            .expect("carriers")
            .iter()
            .filter_map(|carrier| carrier["name"].as_str())
            .collect();
        assert_eq!(names, vec!["Sea Line", "Rail Co"]);
    });
}

#[test]
fn unknown_offer_edits_are_not_found() {
    let dir = tempfile::tempdir().expect("tempdir");
    seed_carriers(dir.path());
    let vars = desk_env(dir.path());

    with_env(&vars, || {
        let result =
            freightq(&["status", "--bid", BID, "--sender", "Nobody", "--status", "rejected"]);
        assert_eq!(result.exit_code, 5, "{}", result.output);
        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "not_found");
    });
}

#[test]
fn duplicate_request_id_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    seed_carriers(dir.path());
    let vars = desk_env(dir.path());

    with_env(&vars, || {
        assert_eq!(submit_request().exit_code, 0);
        let result = submit_request();
        assert_ne!(result.exit_code, 0);
        assert_eq!(parse_payload(&result.output)["status"], "error");
        assert_eq!(outbox_messages(dir.path()), 1);
    });
}

#[test]
fn invalid_config_fails_with_config_validation() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut vars = desk_env(dir.path());
    vars.push(("FREIGHTQ_RATES_TIMEOUT_SECS", "0".to_string()));

    with_env(&vars, || {
        let result = freightq(&["compare"]);
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "compare");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn doctor_reports_missing_inbox() {
    let dir = tempfile::tempdir().expect("tempdir");
    let vars = desk_env(dir.path());

    with_env(&vars, || {
        let result = freightq(&["doctor", "--json"]);
        assert_eq!(result.exit_code, 1);
        let payload = parse_payload(&result.output);
        assert_eq!(payload["overall_status"], "fail");
        let checks = payload["checks"].as_array().expect("checks");
        let spool = checks.iter().find(|check| check["name"] == "mail_spool").expect("spool check");
        assert_eq!(spool["status"], "fail");
        let template =
            checks.iter().find(|check| check["name"] == "contract_template").expect("template check");
        assert_eq!(template["status"], "pass");
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, String)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "FREIGHTQ_STORAGE_DATA_DIR",
        "FREIGHTQ_MAIL_SPOOL_DIR",
        "FREIGHTQ_MAIL_INBOX_FOLDER",
        "FREIGHTQ_MAIL_FROM_ADDRESS",
        "FREIGHTQ_RATES_PROVIDER",
        "FREIGHTQ_RATES_SOURCE_URL",
        "FREIGHTQ_RATES_TIMEOUT_SECS",
        "FREIGHTQ_RATES_CACHE_TTL_SECS",
        "FREIGHTQ_RATES_REFERENCE_CURRENCY",
        "FREIGHTQ_RATES_FALLBACK_USD",
        "FREIGHTQ_RATES_FALLBACK_EUR",
        "FREIGHTQ_CONTRACTS_TEMPLATE_DIR",
        "FREIGHTQ_CONTRACTS_TEMPLATE_NAME",
        "FREIGHTQ_CONTRACTS_ARCHIVE_DIR",
        "FREIGHTQ_CONTRACTS_TRANSIENT_DIR",
        "FREIGHTQ_RECONCILE_DEBOUNCE_SECS",
        "FREIGHTQ_SUBMISSION_MAX_ATTACHMENT_BYTES",
        "FREIGHTQ_LOGGING_LEVEL",
        "FREIGHTQ_LOGGING_FORMAT",
        "FREIGHTQ_LOG_LEVEL",
        "FREIGHTQ_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(test_fn));

    for (key, value) in previous_values {
        match value {
            Some(value) => env::set_var(key, value),
            None => env::remove_var(key),
        }
    }

    if let Err(panic) = result {
        std::panic::resume_unwind(panic);
    }
}

use std::env;
use std::process;
use std::sync::Arc;

use domain::adapters::memory_repo::{InMemoryCollection, InMemoryTable};
use domain::service::UserService;
use domain::validate::new_user_from_fields;
use domain::{StoreError, StoreName};

fn print_usage() {
    eprintln!(
        "{}\n\nUsage:\n  domain create <sql|nosql> <name> <email> <age> [<name> <email> <age> ...]\n  domain contrast\n\nNotes:\n  - This demo CLI uses in-memory stores; data is not persisted across runs.\n  - `contrast` replays the cases where the two stores disagree.",
        domain::about()
    );
}

fn services() -> Result<(UserService, UserService), StoreError> {
    let name = StoreName::new("users")?;
    let table = InMemoryTable::new();
    table.create_table(&name)?;
    Ok((
        UserService::new(Arc::new(table), name.clone()),
        UserService::new(Arc::new(InMemoryCollection::new()), name),
    ))
}

fn attempt(svc: &UserService, name: &str, email: &str, age: &str) {
    let label = svc.backend().kind_label();
    let input = new_user_from_fields(
        Some(name.to_string()),
        Some(email.to_string()),
        Some(age.to_string()),
    );
    match input.and_then(|u| svc.create(u)) {
        Ok(u) => println!(
            "{label:>5}: created {} <{}> age {} as id {}",
            u.name, u.email, u.age, u.id
        ),
        Err(e) => println!("{label:>5}: rejected {name} <{email}> age {age}: {e}"),
    }
}

fn run() -> Result<(), String> {
    let mut args = env::args().skip(1);

    let Some(cmd) = args.next() else {
        print_usage();
        return Ok(());
    };

    let (sql, nosql) = services().map_err(|e| format!("store setup failed: {e}"))?;

    match cmd.as_str() {
        "create" => {
            let Some(backend) = args.next() else {
                return Err("missing <sql|nosql> for create".into());
            };
            let svc = match domain::Backend::parse(&backend) {
                Some(domain::Backend::Relational) => &sql,
                Some(domain::Backend::Document) => &nosql,
                None => return Err(format!("unknown backend: {backend}")),
            };
            let rest: Vec<String> = args.collect();
            if rest.is_empty() || rest.len() % 3 != 0 {
                return Err("expected <name> <email> <age> triples".into());
            }
            for triple in rest.chunks(3) {
                attempt(svc, &triple[0], &triple[1], &triple[2]);
            }
            let all = svc.list().map_err(|e| format!("list failed: {e}"))?;
            println!("{} record(s), newest first:", all.len());
            for u in all {
                println!("  {} {} <{}> {}", u.id, u.name, u.email, u.age);
            }
            Ok(())
        }
        "contrast" => {
            for svc in [&sql, &nosql] {
                attempt(svc, "Ann", "ann@x.com", "40");
                attempt(svc, "Ann Again", "ann@x.com", "41");
                attempt(svc, "Newborn", "zero@x.com", "0");
                attempt(svc, "Elder", "old@x.com", "150");
            }
            Ok(())
        }
        _ => {
            print_usage();
            Ok(())
        }
    }
}

fn main() {
    if let Err(msg) = run() {
        eprintln!("error: {}", msg);
        process::exit(1);
    }
}

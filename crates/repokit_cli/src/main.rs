//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `repokit_core` linkage end to end: config, store, repositories.
//! - Print deterministic output for quick local sanity checks.

use log::{error, info};
use repokit_core::{
    CrudRepository, Member, PageRequest, RepoError, Sort, Store, StoreConfig, Team,
};
use std::error::Error;
use std::process::ExitCode;

fn main() -> ExitCode {
    println!("repokit_core ping={}", repokit_core::ping());
    println!("repokit_core version={}", repokit_core::core_version());

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("event=cli_demo module=cli status=error error={err}");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let config = StoreConfig::from_env()?;
    repokit_core::init_from_config(&config)?;

    let mut store = Store::open(&config)?;
    let uow = store.begin()?;
    seed(&uow)?;

    let members = uow.members()?;
    let request = PageRequest::of(0, 3)?.with_sort(Sort::by("username").desc());
    let page = members.find_by_age(10, &request)?;
    println!(
        "members age=10 page={}/{} total={}",
        page.index() + 1,
        page.total_pages(),
        page.total_elements()
    );
    for member in page.content() {
        println!("  {} (age {})", member.username, member.age);
    }

    for summary in members.find_summaries()? {
        println!("summary id={} username={} team={}", summary.id, summary.username, summary.team_name);
    }

    info!(
        "event=cli_demo module=cli status=ok statements={}",
        uow.statement_count()
    );
    uow.rollback()?;
    Ok(())
}

fn seed(uow: &repokit_core::UnitOfWork<'_>) -> Result<(), RepoError> {
    let teams = uow.teams()?;
    let team_a = teams.save(&Team::new("teamA"))?;
    let team_b = teams.save(&Team::new("teamB"))?;

    let members = uow.members()?;
    for (index, name) in ["member1", "member2", "member3", "member4", "member5"]
        .into_iter()
        .enumerate()
    {
        let team = if index % 2 == 0 { &team_a } else { &team_b };
        members.save(&Member::with_team(name, 10, team)?)?;
    }
    Ok(())
}

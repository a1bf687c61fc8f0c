// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;
use rusqlite::Connection;

use crate::engine::goals::{list_goals, NewGoal};
use crate::engine::Engine;
use crate::models::{Category, Goal, GoalType};
use crate::utils::{
    arg, fmt_money, id_arg, id_for_account, maybe_print_json, opt_arg, opt_date, opt_parsed,
    parse_date, parse_decimal, pretty_table,
};

pub fn handle(
    engine: &Engine,
    conn: &mut Connection,
    owner: &str,
    m: &clap::ArgMatches,
) -> Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => {
            let new = NewGoal {
                name: arg(sub, "name")?.clone(),
                goal_type: arg(sub, "type")?.parse::<GoalType>()?,
                target_amount: parse_decimal(arg(sub, "target")?)?,
                start_date: opt_date(sub, "start")?,
                target_date: parse_date(arg(sub, "by")?)?,
                linked_account_id: opt_arg(sub, "account")
                    .map(|a| id_for_account(conn, owner, a))
                    .transpose()?,
                linked_liability_id: sub.get_one::<i64>("liability").copied(),
                linked_category: opt_parsed::<Category>(sub, "category")?,
            };
            let g = engine.create_goal(conn, owner, new)?;
            println!(
                "Goal '{}' (#{}) created: {} of {} ({}%)",
                g.name,
                g.id,
                fmt_money(&g.current_amount),
                fmt_money(&g.target_amount),
                g.progress.percentage
            );
        }
        Some(("list", sub)) => {
            let data = list_goals(conn, owner)?;
            if maybe_print_json(sub.get_flag("json"), &data)? {
                return Ok(());
            }
            let rows = data.iter().map(row).collect();
            println!(
                "{}",
                pretty_table(
                    &[
                        "Id",
                        "Name",
                        "Type",
                        "Current",
                        "Target",
                        "%",
                        "Monthly",
                        "Projected",
                        "On track",
                        "Status",
                    ],
                    rows
                )
            );
        }
        Some(("refresh", sub)) => {
            let g = engine.update_goal_progress(conn, owner, id_arg(sub, "id")?)?;
            print_progress(&g);
        }
        Some(("contribute", sub)) => {
            let amount = parse_decimal(arg(sub, "amount")?)?;
            let g = engine.contribute_to_goal(conn, owner, id_arg(sub, "id")?, amount)?;
            print_progress(&g);
        }
        _ => {}
    }
    Ok(())
}

fn print_progress(g: &Goal) {
    println!(
        "Goal '{}': {} of {} ({}%), {}",
        g.name,
        fmt_money(&g.current_amount),
        fmt_money(&g.target_amount),
        g.progress.percentage,
        g.status
    );
}

fn row(g: &Goal) -> Vec<String> {
    vec![
        g.id.to_string(),
        g.name.clone(),
        g.goal_type.to_string(),
        fmt_money(&g.current_amount),
        fmt_money(&g.target_amount),
        g.progress.percentage.to_string(),
        fmt_money(&g.progress.monthly_target),
        g.progress
            .projected_completion
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".into()),
        if g.progress.is_on_track { "yes" } else { "no" }.to_string(),
        g.status.to_string(),
    ]
}

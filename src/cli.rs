// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};

pub const OWNER_ENV: &str = "LEDGERWISE_OWNER";
pub const DEFAULT_OWNER: &str = "default";

fn json_flag() -> Arg {
    Arg::new("json")
        .long("json")
        .action(ArgAction::SetTrue)
        .help("Print JSON instead of a table")
}

fn id_arg(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name)
        .required(true)
        .value_parser(value_parser!(i64))
        .help(help)
}

fn recurring_args(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("every")
            .long("every")
            .help("Repeat frequency: daily|weekly|monthly|quarterly|yearly"),
    )
    .arg(
        Arg::new("interval")
            .long("interval")
            .value_parser(value_parser!(u32))
            .default_value("1"),
    )
    .arg(Arg::new("until").long("until").help("Last date YYYY-MM-DD"))
}

pub fn build_cli() -> Command {
    Command::new("ledgerwise")
        .about("Personal ledger with liabilities, bills, budgets, goals and period settlement")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::new("owner")
                .long("owner")
                .global(true)
                .help("Acting owner (falls back to LEDGERWISE_OWNER, then 'default')"),
        )
        .subcommand(Command::new("init").about("Initialize the database"))
        .subcommand(
            Command::new("account")
                .about("Manage accounts")
                .subcommand(
                    Command::new("add")
                        .arg(Arg::new("name").required(true))
                        .arg(
                            Arg::new("type")
                                .long("type")
                                .required(true)
                                .help("cash|bank|savings|investment|loan"),
                        )
                        .arg(Arg::new("opening").long("opening").default_value("0")),
                )
                .subcommand(
                    Command::new("list")
                        .arg(
                            Arg::new("all")
                                .long("all")
                                .action(ArgAction::SetTrue)
                                .help("Include inactive accounts"),
                        )
                        .arg(json_flag()),
                )
                .subcommand(
                    Command::new("rename")
                        .arg(Arg::new("account").required(true))
                        .arg(Arg::new("name").required(true)),
                )
                .subcommand(Command::new("deactivate").arg(Arg::new("account").required(true)))
                .subcommand(Command::new("reactivate").arg(Arg::new("account").required(true))),
        )
        .subcommand(
            Command::new("tx")
                .about("Record and edit transactions")
                .subcommand(recurring_args(
                    Command::new("add")
                        .arg(
                            Arg::new("type")
                                .required(true)
                                .help("income|expense|transfer|liability"),
                        )
                        .arg(Arg::new("account").required(true))
                        .arg(Arg::new("amount").required(true))
                        .arg(Arg::new("category").long("category"))
                        .arg(Arg::new("to").long("to").help("Destination account for transfers"))
                        .arg(Arg::new("date").long("date").help("YYYY-MM-DD, defaults to today"))
                        .arg(Arg::new("description").long("description"))
                        .arg(
                            Arg::new("approval")
                                .long("approval")
                                .action(ArgAction::SetTrue)
                                .help("Recurring cycles wait for approval"),
                        ),
                ))
                .subcommand(
                    Command::new("update")
                        .arg(id_arg("id", "Transaction id"))
                        .arg(Arg::new("amount").long("amount"))
                        .arg(Arg::new("account").long("account"))
                        .arg(Arg::new("to").long("to"))
                        .arg(Arg::new("category").long("category"))
                        .arg(Arg::new("date").long("date"))
                        .arg(Arg::new("description").long("description")),
                )
                .subcommand(Command::new("rm").arg(id_arg("id", "Transaction id")))
                .subcommand(
                    Command::new("list")
                        .arg(Arg::new("account").long("account"))
                        .arg(Arg::new("category").long("category"))
                        .arg(Arg::new("type").long("type"))
                        .arg(Arg::new("period").long("period").help("YYYY-MM or YYYY"))
                        .arg(
                            Arg::new("templates")
                                .long("templates")
                                .action(ArgAction::SetTrue)
                                .help("Include recurring templates"),
                        )
                        .arg(
                            Arg::new("limit")
                                .long("limit")
                                .value_parser(value_parser!(usize)),
                        )
                        .arg(json_flag()),
                ),
        )
        .subcommand(
            Command::new("liability")
                .about("Track debts and their payments")
                .subcommand(
                    Command::new("add")
                        .arg(Arg::new("name").required(true))
                        .arg(Arg::new("total").required(true))
                        .arg(
                            Arg::new("kind")
                                .long("kind")
                                .default_value("loan")
                                .help("loan|credit_card|mortgage|personal_debt|other"),
                        )
                        .arg(Arg::new("lender").long("lender"))
                        .arg(Arg::new("rate").long("rate").help("Interest rate, percent"))
                        .arg(Arg::new("due").long("due"))
                        .arg(
                            Arg::new("received-into")
                                .long("received-into")
                                .help("Account credited with the borrowed amount"),
                        ),
                )
                .subcommand(
                    Command::new("pay")
                        .arg(id_arg("id", "Liability id"))
                        .arg(Arg::new("amount").required(true))
                        .arg(Arg::new("from").long("from").required(true))
                        .arg(Arg::new("date").long("date")),
                )
                .subcommand(Command::new("list").arg(json_flag()))
                .subcommand(
                    Command::new("payments")
                        .arg(id_arg("id", "Liability id"))
                        .arg(json_flag()),
                ),
        )
        .subcommand(
            Command::new("bill")
                .about("Bills and reminders")
                .subcommand(recurring_args(
                    Command::new("add")
                        .arg(Arg::new("name").required(true))
                        .arg(Arg::new("amount").required(true))
                        .arg(Arg::new("due").long("due").required(true))
                        .arg(Arg::new("category").long("category").default_value("bills"))
                        .arg(
                            Arg::new("remind")
                                .long("remind")
                                .value_parser(value_parser!(u32))
                                .action(ArgAction::Append)
                                .help("Days before the due date; repeatable"),
                        ),
                ))
                .subcommand(
                    Command::new("pay")
                        .arg(id_arg("id", "Bill id"))
                        .arg(Arg::new("from").long("from").required(true))
                        .arg(Arg::new("amount").long("amount"))
                        .arg(Arg::new("date").long("date")),
                )
                .subcommand(Command::new("list").arg(json_flag()))
                .subcommand(
                    Command::new("upcoming")
                        .arg(
                            Arg::new("days")
                                .long("days")
                                .value_parser(value_parser!(u32))
                                .default_value("7"),
                        )
                        .arg(json_flag()),
                )
                .subcommand(Command::new("remind").about("Send reminders that are due")),
        )
        .subcommand(
            Command::new("budget")
                .about("Category budgets")
                .subcommand(
                    Command::new("add")
                        .arg(Arg::new("name").required(true))
                        .arg(Arg::new("category").required(true))
                        .arg(Arg::new("amount").required(true))
                        .arg(Arg::new("period").long("period").help("YYYY-MM or YYYY"))
                        .arg(Arg::new("start").long("start"))
                        .arg(Arg::new("end").long("end"))
                        .arg(
                            Arg::new("threshold")
                                .long("threshold")
                                .value_parser(value_parser!(u8)),
                        ),
                )
                .subcommand(Command::new("list").arg(json_flag()))
                .subcommand(Command::new("refresh").arg(id_arg("id", "Budget id"))),
        )
        .subcommand(
            Command::new("goal")
                .about("Savings, investment, debt payoff and spending goals")
                .subcommand(
                    Command::new("add")
                        .arg(Arg::new("name").required(true))
                        .arg(
                            Arg::new("type")
                                .required(true)
                                .help("savings|investment|debt_payoff|expense_reduction"),
                        )
                        .arg(Arg::new("target").required(true))
                        .arg(Arg::new("by").long("by").required(true).help("Target date"))
                        .arg(Arg::new("start").long("start"))
                        .arg(Arg::new("account").long("account"))
                        .arg(
                            Arg::new("liability")
                                .long("liability")
                                .value_parser(value_parser!(i64)),
                        )
                        .arg(Arg::new("category").long("category")),
                )
                .subcommand(Command::new("list").arg(json_flag()))
                .subcommand(Command::new("refresh").arg(id_arg("id", "Goal id")))
                .subcommand(
                    Command::new("contribute")
                        .arg(id_arg("id", "Goal id"))
                        .arg(Arg::new("amount").required(true)),
                ),
        )
        .subcommand(
            Command::new("recurring")
                .about("Recurring templates and approvals")
                .subcommand(Command::new("list").arg(json_flag()))
                .subcommand(Command::new("pending").arg(json_flag()))
                .subcommand(
                    Command::new("approve")
                        .arg(id_arg("id", "Template id"))
                        .arg(Arg::new("amount").long("amount")),
                )
                .subcommand(Command::new("skip").arg(id_arg("id", "Template id")))
                .subcommand(Command::new("cancel").arg(id_arg("id", "Template id")))
                .subcommand(Command::new("process").about("Post due cycles that need no approval")),
        )
        .subcommand(
            Command::new("settle")
                .about("Close a period")
                .subcommand(Command::new("run").arg(Arg::new("period").required(true)))
                .subcommand(Command::new("check"))
                .subcommand(
                    Command::new("show")
                        .arg(Arg::new("period").required(true))
                        .arg(json_flag()),
                )
                .subcommand(Command::new("list").arg(json_flag()))
                .subcommand(
                    Command::new("notes")
                        .arg(Arg::new("period").required(true))
                        .arg(Arg::new("text").help("Omit to clear the notes")),
                )
                .subcommand(
                    Command::new("export")
                        .arg(Arg::new("period").required(true))
                        .arg(Arg::new("format").long("format").required(true).help("csv|json"))
                        .arg(Arg::new("out").long("out").required(true)),
                ),
        )
        .subcommand(
            Command::new("report")
                .about("Reports")
                .subcommand(Command::new("balances").arg(json_flag())),
        )
        .subcommand(Command::new("doctor").about("Check balances against the ledger"))
        .subcommand(
            Command::new("config")
                .about("Runtime settings")
                .subcommand(Command::new("get").arg(Arg::new("key").required(true)))
                .subcommand(
                    Command::new("set")
                        .arg(Arg::new("key").required(true))
                        .arg(Arg::new("value").required(true)),
                )
                .subcommand(Command::new("list")),
        )
}

/// The acting owner: `--owner`, then `LEDGERWISE_OWNER`, then `default`.
pub fn owner(m: &ArgMatches) -> String {
    m.get_one::<String>("owner")
        .cloned()
        .or_else(|| std::env::var(OWNER_ENV).ok())
        .filter(|o| !o.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_OWNER.to_string())
}

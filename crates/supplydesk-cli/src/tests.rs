use super::*;

#[test]
fn parses_migrate_command() {
    let cli = Cli::try_parse_from(["supplydesk-cli", "migrate"]).expect("expected valid cli args");

    assert!(matches!(cli.command, Some(Commands::Migrate)));
}

#[test]
fn no_command_is_none() {
    let cli = Cli::try_parse_from(["supplydesk-cli"]).expect("expected valid cli args");
    assert!(cli.command.is_none());
}

#[test]
fn parses_recovery_sweep_command() {
    let cli = Cli::try_parse_from(["supplydesk-cli", "recovery", "sweep"]).unwrap();

    assert!(matches!(
        cli.command,
        Some(Commands::Recovery {
            command: RecoveryCommands::Sweep
        })
    ));
}

#[test]
fn recovery_queue_defaults_limit() {
    let cli = Cli::try_parse_from(["supplydesk-cli", "recovery", "queue"]).unwrap();

    assert!(matches!(
        cli.command,
        Some(Commands::Recovery {
            command: RecoveryCommands::Queue { limit: 20 }
        })
    ));
}

#[test]
fn parses_recovery_retry_with_submission_id() {
    let id = "7f1c3a2e-5b6d-4e8f-9a0b-1c2d3e4f5a6b";
    let cli = Cli::try_parse_from(["supplydesk-cli", "recovery", "retry", id]).unwrap();

    match cli.command {
        Some(Commands::Recovery {
            command: RecoveryCommands::Retry { submission_id },
        }) => assert_eq!(submission_id.to_string(), id),
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn recovery_retry_rejects_malformed_id() {
    let result = Cli::try_parse_from(["supplydesk-cli", "recovery", "retry", "not-a-uuid"]);
    assert!(result.is_err());
}

#[test]
fn recovery_retry_requires_id() {
    let result = Cli::try_parse_from(["supplydesk-cli", "recovery", "retry"]);
    assert!(result.is_err());
}

#[test]
fn parses_submissions_reprocess_command() {
    let cli = Cli::try_parse_from([
        "supplydesk-cli",
        "submissions",
        "reprocess",
        "7f1c3a2e-5b6d-4e8f-9a0b-1c2d3e4f5a6b",
    ])
    .unwrap();

    assert!(matches!(
        cli.command,
        Some(Commands::Submissions {
            command: SubmissionCommands::Reprocess { .. }
        })
    ));
}

#[test]
fn parses_report_suppliers_with_limit() {
    let cli =
        Cli::try_parse_from(["supplydesk-cli", "report", "suppliers", "--limit", "5"]).unwrap();

    assert!(matches!(
        cli.command,
        Some(Commands::Report {
            command: ReportCommands::Suppliers { limit: 5 }
        })
    ));
}

#[test]
fn report_trends_defaults_to_a_week() {
    let cli = Cli::try_parse_from(["supplydesk-cli", "report", "trends"]).unwrap();

    assert!(matches!(
        cli.command,
        Some(Commands::Report {
            command: ReportCommands::Trends { days: 7 }
        })
    ));
}

#[test]
fn unknown_subcommand_is_rejected() {
    let result = Cli::try_parse_from(["supplydesk-cli", "scrape"]);
    assert!(result.is_err());
}

#[test]
fn fmt_opt_renders_missing_values_as_dash() {
    assert_eq!(fmt_opt(None::<i64>), "-");
    assert_eq!(fmt_opt(Some(42)), "42");
}

//! Simulate command implementation.
//!
//! Builds a gateway and `nodes` verifier nodes on an in-memory network, then
//! issues a credential, authenticates with it, revokes it and waits for the
//! revocation to converge. Timing is real: with lost pushes convergence
//! waits for the next reconciliation pull.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ciphera_canonical::{Actor, CredentialId, EventId, NodeId, SubjectId};
use ciphera_core::{CoreConfig, SharedClock, SystemClock, VerifyStatus};
use ciphera_gateway::{AuthDecision, BiometricVote, GatewayCoordinator, IssueDecision, RevokeDecision};
use ciphera_ledger::{Ledger, WriteOptions};
use ciphera_node::{InMemoryNetwork, SharedTransport, VerifierNode};
use serde::Serialize;
use tracing::info;

use crate::error::CliError;

pub struct SimulateArgs {
    pub config: Option<String>,
    pub nodes: usize,
    pub latency_ms: u64,
    pub drop_pushes: Vec<String>,
    pub ledger_dir: Option<String>,
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct NodeReport {
    node_id: NodeId,
    status: VerifyStatus,
    ledger_entries: usize,
    chain_intact: bool,
}

#[derive(Debug, Serialize)]
struct SimulationReport {
    credential_id: CredentialId,
    replicated_to: Vec<NodeId>,
    status_before: VerifyStatus,
    session_opened: bool,
    event_id: EventId,
    status_after: VerifyStatus,
    converged: bool,
    convergence_ms: u128,
    pending: Vec<NodeId>,
    nodes: Vec<NodeReport>,
}

pub fn run(args: SimulateArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = match &args.config {
        Some(path) => CoreConfig::from_path(path)?,
        None => CoreConfig::default(),
    };
    if args.nodes == 0 {
        return Err("--nodes must be at least 1".into());
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let report = runtime.block_on(simulate(&args, config))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if !report.converged {
        return Err(CliError::NotConverged {
            event_id: report.event_id,
            pending: report.pending,
        }
        .into());
    }
    Ok(())
}

fn open_ledger(
    dir: Option<&Path>,
    node_id: &NodeId,
    clock: &SharedClock,
) -> Result<Arc<Ledger>, Box<dyn std::error::Error>> {
    let ledger = match dir {
        Some(dir) => {
            let path: PathBuf = dir.join(format!("{}.ledger", node_id));
            Ledger::open(&path, clock.clone(), WriteOptions::default())
                .map_err(|e| format!("Failed to open ledger {}: {}", path.display(), e))?
        }
        None => Ledger::in_memory(clock.clone()),
    };
    Ok(Arc::new(ledger))
}

async fn simulate(
    args: &SimulateArgs,
    config: CoreConfig,
) -> Result<SimulationReport, Box<dyn std::error::Error>> {
    let clock: SharedClock = Arc::new(SystemClock);
    let dir = args.ledger_dir.as_deref().map(Path::new);
    if let Some(dir) = dir {
        std::fs::create_dir_all(dir)?;
    }

    let net = Arc::new(InMemoryNetwork::new(Duration::from_millis(args.latency_ms)));
    let transport: SharedTransport = net.clone();

    let gateway_id = NodeId::parse("gateway")?;
    let gateway = Arc::new(VerifierNode::new(
        gateway_id.clone(),
        open_ledger(dir, &gateway_id, &clock)?,
        clock.clone(),
        &config,
    ));
    net.register(gateway.clone());
    let coordinator = GatewayCoordinator::new(gateway.clone(), transport.clone(), clock.clone(), config.clone());

    let mut nodes = Vec::with_capacity(args.nodes);
    let mut tasks = Vec::new();
    for i in 1..=args.nodes {
        let node_id = NodeId::parse(format!("node{}", i))?;
        let node = Arc::new(VerifierNode::new(
            node_id.clone(),
            open_ledger(dir, &node_id, &clock)?,
            clock.clone(),
            &config,
        ));
        net.register(node.clone());
        coordinator.register_node(node_id);
        tasks.push(node.clone().spawn_reconciliation(
            transport.clone(),
            gateway_id.clone(),
            config.reconciliation_interval,
            config.push_timeout,
        ));
        nodes.push(node);
    }
    let gateway_tasks = coordinator.start();

    let subject = SubjectId::parse("alice@example.org")?;
    let (credential, replicated_to) = match coordinator.issue(subject, true).await? {
        IssueDecision::Issued {
            credential,
            replicated_to,
        } => (credential, replicated_to),
        other => {
            return Err(CliError::Unexpected {
                step: "issue",
                detail: format!("{:?}", other),
            }
            .into())
        }
    };
    let credential_id = credential.credential_id.clone();
    let status_before = coordinator.verify(&credential_id).await?;

    let votes: Vec<BiometricVote> = nodes
        .iter()
        .map(|n| BiometricVote::accept(n.node_id().clone()))
        .collect();
    let session_opened = matches!(
        coordinator.authenticate(&credential_id, &votes).await?,
        AuthDecision::Accepted { .. }
    );

    for name in &args.drop_pushes {
        net.drop_pushes_to(&NodeId::parse(name.as_str())?);
    }

    let started = Instant::now();
    let event = match coordinator.revoke(&credential_id, Actor::parse("operator")?).await? {
        RevokeDecision::Accepted { event } => event,
        RevokeDecision::NotFound => {
            return Err(CliError::Unexpected {
                step: "revoke",
                detail: "credential not found".to_string(),
            }
            .into())
        }
    };
    let status_after = coordinator.verify(&credential_id).await?;

    let propagator = coordinator.propagator();
    let converged = propagator
        .await_convergence(&event.event_id, config.convergence_bound())
        .await
        .is_ok();
    let convergence_ms = started.elapsed().as_millis();
    let pending = propagator.pending_nodes(&event.event_id).unwrap_or_default();
    info!(converged, convergence_ms, "simulation finished");

    gateway_tasks.abort();
    for task in &tasks {
        task.abort();
    }

    let mut reports = Vec::with_capacity(nodes.len() + 1);
    for node in std::iter::once(&gateway).chain(nodes.iter()) {
        reports.push(NodeReport {
            node_id: node.node_id().clone(),
            status: node.verify(&credential_id)?,
            ledger_entries: node.ledger().len(),
            chain_intact: node.ledger().verify(..).is_intact(),
        });
    }

    Ok(SimulationReport {
        credential_id,
        replicated_to,
        status_before,
        session_opened,
        event_id: event.event_id,
        status_after,
        converged,
        convergence_ms,
        pending,
        nodes: reports,
    })
}

fn print_report(report: &SimulationReport) {
    println!("{:<16} {}", "CREDENTIAL", report.credential_id);
    println!("{:<16} {}", "REPLICAS", report.replicated_to.len());
    println!("{:<16} {:?}", "BEFORE", report.status_before);
    println!("{:<16} {}", "SESSION", report.session_opened);
    println!("{:<16} {}", "EVENT", report.event_id);
    println!("{:<16} {:?}", "AFTER", report.status_after);
    println!(
        "{:<16} {} ({} ms)",
        "CONVERGED", report.converged, report.convergence_ms
    );
    println!();
    println!("{:<12} {:<10} {:<8} {}", "NODE", "STATUS", "ENTRIES", "CHAIN");
    println!("{}", "-".repeat(44));
    for node in &report.nodes {
        println!(
            "{:<12} {:<10} {:<8} {}",
            node.node_id.as_str(),
            format!("{:?}", node.status),
            node.ledger_entries,
            if node.chain_intact { "intact" } else { "broken" }
        );
    }
}

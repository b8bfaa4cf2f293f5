//! CLI de operador sobre el backend persistente.
//!
//! Uso:
//!   migra start --type <NOMBRE> --tenant <UUID> --engagement <UUID>
//!   migra status --flow <UUID>
//!   migra advance --flow <UUID>
//!   migra pause --flow <UUID>
//!   migra resume --flow <UUID>
//!   migra retry --flow <UUID>
//!   migra skip --flow <UUID> [--reason <TXT>]
//!   migra input --flow <UUID> --source <TXT> --data '<JSON>'
//!   migra rollback --flow <UUID> --to-phase <FASE> [--ack-irreversible]
//!
//! Códigos de salida: 0 ok, 2 uso, 3 parseo, 4 rechazo de dominio, 5 infra.

use std::sync::Arc;

use migra_core::{FlowEngine, NullExecutor, TenantScope};
use migra_persistence::{build_dev_pool_from_env, PgEventStore, PgFlowRepository, PoolProvider};
use uuid::Uuid;

type PgEngine = FlowEngine<PgEventStore<PoolProvider>, PgFlowRepository>;

struct Args {
    flow: Option<Uuid>,
    flow_type: Option<String>,
    tenant: Option<Uuid>,
    engagement: Option<Uuid>,
    to_phase: Option<String>,
    source: Option<String>,
    data: Option<String>,
    reason: Option<String>,
    ack_irreversible: bool,
}

fn parse_flags(raw: &[String]) -> Args {
    let mut args = Args { flow: None,
                          flow_type: None,
                          tenant: None,
                          engagement: None,
                          to_phase: None,
                          source: None,
                          data: None,
                          reason: None,
                          ack_irreversible: false };
    let mut i = 0;
    while i < raw.len() {
        match raw[i].as_str() {
            "--flow" => {
                i += 1;
                if i < raw.len() { args.flow = Uuid::parse_str(&raw[i]).ok(); }
            }
            "--type" => {
                i += 1;
                if i < raw.len() { args.flow_type = Some(raw[i].clone()); }
            }
            "--tenant" => {
                i += 1;
                if i < raw.len() { args.tenant = Uuid::parse_str(&raw[i]).ok(); }
            }
            "--engagement" => {
                i += 1;
                if i < raw.len() { args.engagement = Uuid::parse_str(&raw[i]).ok(); }
            }
            "--to-phase" => {
                i += 1;
                if i < raw.len() { args.to_phase = Some(raw[i].clone()); }
            }
            "--reason" => {
                i += 1;
                if i < raw.len() { args.reason = Some(raw[i].clone()); }
            }
            "--source" => {
                i += 1;
                if i < raw.len() { args.source = Some(raw[i].clone()); }
            }
            "--data" => {
                i += 1;
                if i < raw.len() { args.data = Some(raw[i].clone()); }
            }
            "--ack-irreversible" => {
                args.ack_irreversible = true;
            }
            _ => {}
        }
        i += 1;
    }
    args
}

fn build_engine() -> PgEngine {
    if std::env::var("DATABASE_URL").is_err() {
        eprintln!("[migra] requiere DATABASE_URL para operar contra backend persistente");
        std::process::exit(4);
    }
    let ctx = match migra_flows::build_app_context(Arc::new(NullExecutor)) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("[migra] contexto incompleto: {e}");
            std::process::exit(5);
        }
    };
    let pool = match build_dev_pool_from_env() {
        Ok(p) => p,
        Err(e) => {
            eprintln!("[migra] pool error: {e}");
            std::process::exit(5);
        }
    };
    let event_store = PgEventStore::new(PoolProvider { pool });
    FlowEngine::new(event_store, PgFlowRepository::new(), ctx)
}

fn require_flow(args: &Args) -> Uuid {
    match args.flow {
        Some(id) => id,
        None => {
            eprintln!("Falta --flow <UUID>");
            std::process::exit(2);
        }
    }
}

fn report<T: std::fmt::Debug>(result: Result<T, migra_core::FlowEngineError>, ok_prefix: &str) {
    match result {
        Ok(v) => {
            println!("{ok_prefix}: {v:?}");
            std::process::exit(0);
        }
        Err(e) => {
            eprintln!("rechazado: {e}");
            std::process::exit(4);
        }
    }
}

fn main() {
    // Cargar .env si existe para obtener DATABASE_URL
    let _ = dotenvy::dotenv();
    let argv: Vec<String> = std::env::args().collect();
    if argv.len() < 2 {
        eprintln!("Uso: migra <start|status|advance|pause|resume|retry|skip|input|rollback> [flags]");
        std::process::exit(2);
    }
    let command = argv[1].as_str();
    let args = parse_flags(&argv[2..]);

    let mut engine = build_engine();
    match command {
        "start" => {
            let (Some(flow_type), Some(tenant), Some(engagement)) =
                (args.flow_type.clone(), args.tenant, args.engagement)
            else {
                eprintln!("Uso: migra start --type <NOMBRE> --tenant <UUID> --engagement <UUID>");
                std::process::exit(2);
            };
            report(engine.start_flow(&flow_type, TenantScope::new(tenant, engagement)), "iniciado");
        }
        "status" => {
            let flow_id = require_flow(&args);
            match engine.load(flow_id) {
                Ok(instance) => {
                    println!("flow={} type={} status={:?} cursor={}",
                             instance.id, instance.flow_type, instance.status, instance.cursor);
                    for slot in &instance.phases {
                        println!("  {} -> {:?} (intentos: {})", slot.phase, slot.status, slot.attempts);
                    }
                    std::process::exit(0);
                }
                Err(e) => {
                    eprintln!("flow no encontrado: {e}");
                    std::process::exit(4);
                }
            }
        }
        "advance" => report(engine.advance(require_flow(&args)), "avanzado"),
        "pause" => report(engine.pause(require_flow(&args)), "pausado"),
        "resume" => report(engine.resume(require_flow(&args)), "reanudado"),
        "retry" => report(engine.retry_failed(require_flow(&args)), "reintento habilitado"),
        "skip" => {
            let flow_id = require_flow(&args);
            let reason = args.reason.clone().unwrap_or_else(|| "operator skip".to_string());
            report(engine.skip_phase(flow_id, &reason), "omitido");
        }
        "input" => {
            let flow_id = require_flow(&args);
            let (Some(source), Some(raw)) = (args.source.clone(), args.data.clone()) else {
                eprintln!("Uso: migra input --flow <UUID> --source <TXT> --data '<JSON>'");
                std::process::exit(2);
            };
            let data: serde_json::Value = match serde_json::from_str(&raw) {
                Ok(v) => v,
                Err(e) => {
                    eprintln!("[migra input] JSON inválido: {e}");
                    std::process::exit(3);
                }
            };
            report(engine.provide_input(flow_id, &source, data), "aportado");
        }
        "rollback" => {
            let flow_id = require_flow(&args);
            let Some(to_phase) = args.to_phase.clone() else {
                eprintln!("Uso: migra rollback --flow <UUID> --to-phase <FASE> [--ack-irreversible]");
                std::process::exit(2);
            };
            report(engine.rollback_to(flow_id, &to_phase, args.ack_irreversible),
                   "revertido (claves limpiadas)");
        }
        _ => {
            eprintln!("Comando desconocido: {command}");
            std::process::exit(2);
        }
    }
}

//! Demo de extremo a extremo del motor en memoria: recolección de datos
//! completa, incluida la suspensión natural en la fase manual y el aporte
//! de respuestas fuera de banda.
//!
//! Con `--features pg_demo` y DATABASE_URL definido, ejecuta además una
//! pasada persistente (eventos en Postgres y write-back de respuestas).

use migra_core::{AdvanceOutcome, FlowEngineError, TenantScope};
use serde_json::json;
use uuid::Uuid;

fn main() {
    // Cargar .env si existe antes de leer DATABASE_URL
    let _ = dotenvy::dotenv();

    let mut engine = match migraflow_rust::build_demo_engine() {
        Ok(e) => e,
        Err(e) => {
            eprintln!("[demo] contexto incompleto: {e}");
            std::process::exit(1);
        }
    };

    let scope = TenantScope::new(Uuid::new_v4(), Uuid::new_v4());
    let flow_id = engine.start_flow("data-collection", scope).expect("start ok");
    println!("[demo] flow iniciado: {flow_id}");

    // Semillas que en producción aporta la capa de ingesta
    engine.provide_input(flow_id, "demo-seed", json!({
        "platform_hints": ["vmware", "aws"],
        "platform_credentials": {"vmware": "vc-token", "aws": "iam-role"},
        "platform_data_sources": {
            "vmware": {
                "records": [
                    {"application_name": "erp", "environment": "prod", "criticality": null,
                     "business_owner": "ops", "operating_system": "rhel8"},
                ],
                "quality": 0.91,
            },
            "aws": {
                "records": [
                    {"application_name": "crm", "environment": "prod", "criticality": "high",
                     "business_owner": null, "operating_system": "al2023"},
                ],
                "quality": 0.88,
            }
        }
    })).expect("seed ok");

    // Avanza hasta que la fase manual bloquee esperando respuestas
    loop {
        match engine.advance(flow_id) {
            Ok(AdvanceOutcome::PhaseCompleted { phase }) => println!("[demo] fase completada: {phase}"),
            Ok(AdvanceOutcome::PhaseSkipped { phase }) => println!("[demo] fase omitida: {phase}"),
            Ok(AdvanceOutcome::RolledBack { to_phase }) => println!("[demo] revertido a: {to_phase}"),
            Ok(AdvanceOutcome::FlowCompleted { flow_fingerprint }) => {
                println!("[demo] flujo completado, fingerprint {flow_fingerprint}");
                break;
            }
            Err(FlowEngineError::Validation { phase, errors, .. }) if phase == "manual-collection" => {
                println!("[demo] suspendido en {phase}: {errors:?}");
                engine.provide_input(flow_id, "operator", json!({
                    "manual_responses": [
                        {"field_name": "criticality", "application_name": "erp", "value": "critical"},
                        {"field_name": "business_owner", "application_name": "crm", "value": "sales-it"},
                    ]
                })).expect("input ok");
                println!("[demo] respuestas manuales aportadas, reanudando");
            }
            Err(e) => {
                eprintln!("[demo] error: {e}");
                std::process::exit(1);
            }
        }
    }

    let instance = engine.load(flow_id).expect("load ok");
    println!("[demo] estado final: {:?}", instance.status);
    if let Some(summary) = instance.phase_state.get("assessment_summary") {
        println!("[demo] resumen: {summary}");
    }
    println!("[demo] checkpoints: {}", instance.checkpoints.len());

    #[cfg(feature = "pg_demo")]
    maybe_run_pg_demo();
    #[cfg(not(feature = "pg_demo"))]
    eprintln!("[demo] pasada Postgres omitida (compila con --features pg_demo)");
}

#[cfg(feature = "pg_demo")]
fn maybe_run_pg_demo() {
    use migra_domain::{Gap, GapPriority, QuestionnaireResponse};
    use migra_persistence::pg::writeback::{insert_asset, write_back_transactional, NewAssetRow};
    use migra_persistence::{build_dev_pool_from_env, PgEventStore, PgFlowRepository, PoolProvider};

    if std::env::var("DATABASE_URL").is_err() {
        eprintln!("[pg demo] DATABASE_URL no definido; omitiendo");
        return;
    }
    let pool = match build_dev_pool_from_env() {
        Ok(p) => p,
        Err(e) => {
            eprintln!("[pg demo] pool error: {e}");
            return;
        }
    };

    // Pasada persistente del mismo flujo
    let ctx = match migra_flows::build_app_context(std::sync::Arc::new(migra_core::NullExecutor)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("[pg demo] contexto incompleto: {e}");
            return;
        }
    };
    let store = PgEventStore::new(PoolProvider { pool: pool.clone() });
    let mut engine = migra_core::FlowEngine::new(store, PgFlowRepository::new(), ctx);
    let scope = TenantScope::new(Uuid::new_v4(), Uuid::new_v4());
    match engine.start_flow("discovery", scope) {
        Ok(flow_id) => {
            if let Err(e) = engine.run_to_completion(flow_id) {
                eprintln!("[pg demo] flujo no completó: {e}");
            } else {
                println!("[pg demo] flujo discovery persistido y completado: {flow_id}");
            }
        }
        Err(e) => eprintln!("[pg demo] start error: {e}"),
    }

    // Write-back mínimo de una respuesta resuelta
    let mut conn = match pool.get() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("[pg demo] conexión: {e}");
            return;
        }
    };
    let asset_id = Uuid::new_v4();
    let row = NewAssetRow { id: &asset_id,
                            tenant_id: &scope.tenant_id,
                            engagement_id: &scope.engagement_id,
                            application_name: "erp" };
    if let Err(e) = insert_asset(&mut conn, &row) {
        eprintln!("[pg demo] insert asset: {e}");
        return;
    }
    let gap = Gap::new(scope.tenant_id, scope.engagement_id, "environment", "coverage",
                       GapPriority::High, json!({"asset_id": asset_id}))
        .and_then(|g| g.resolve())
        .expect("gap válido");
    let response = QuestionnaireResponse::new(scope.tenant_id, scope.engagement_id,
                                              Some(gap.id()), "environment", json!("production"), 0.97)
        .expect("respuesta válida");
    match write_back_transactional(&mut conn, &scope, &[gap], &[response], 50) {
        Ok(r) => println!("[pg demo] write-back: {} registros, {} campos", r.updated_assets, r.applied_fields.len()),
        Err(e) => eprintln!("[pg demo] write-back error: {e}"),
    }
}

use crate::config::Config;
use crate::error::SimError;
use crate::patient::PatientParams;
use crate::simulation::scenario::Scenario;
use crate::simulation::session::SessionRegistry;
use crate::ventilator::pircs::PircsCommand;
use crate::ventilator::VentilatorSettings;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use warp::http::StatusCode;
use warp::reply::{Json, WithStatus};
use warp::Filter;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateSessionRequest {
    pub patient: Option<PatientParams>,
    pub ventilator: Option<VentilatorSettings>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub status: String,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

type Reply = WithStatus<Json>;

pub struct RestApi {
    sessions: Arc<SessionRegistry>,
    patient_defaults: PatientParams,
    ventilator_defaults: VentilatorSettings,
}

impl RestApi {
    pub fn new(config: &Config) -> Self {
        RestApi {
            sessions: Arc::new(SessionRegistry::new(config.simulation.clone())),
            patient_defaults: config.patient.clone(),
            ventilator_defaults: config.ventilator.clone(),
        }
    }

    pub fn sessions(&self) -> Arc<SessionRegistry> {
        Arc::clone(&self.sessions)
    }

    pub fn routes(&self) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
        // Display clients poll from other origins
        let cors = warp::cors()
            .allow_any_origin()
            .allow_methods(vec!["GET", "POST", "DELETE", "OPTIONS"])
            .allow_headers(vec!["X-Requested-With", "Content-Type"])
            .max_age(1000);

        self.create_session()
            .or(self.get_data())
            .or(self.post_control())
            .or(self.get_session())
            .or(self.delete_session())
            .or(self.post_scenario())
            .with(cors)
    }

    fn create_session(&self) -> impl Filter<Extract = (Reply,), Error = warp::Rejection> + Clone {
        let sessions = Arc::clone(&self.sessions);
        let patient_defaults = self.patient_defaults.clone();
        let ventilator_defaults = self.ventilator_defaults.clone();

        warp::path!("sessions")
            .and(warp::post())
            .and(warp::body::json())
            .and_then(move |request: CreateSessionRequest| {
                let sessions = Arc::clone(&sessions);
                let patient = request.patient.unwrap_or_else(|| patient_defaults.clone());
                let ventilator = request.ventilator.unwrap_or_else(|| ventilator_defaults.clone());
                async move {
                    let reply = match sessions.create(patient, ventilator, chrono::Utc::now()) {
                        Ok(id) => respond(
                            StatusCode::CREATED,
                            "Session created",
                            Some(serde_json::json!({ "id": id })),
                        ),
                        Err(err) => error_reply(&err),
                    };
                    Ok::<Reply, Infallible>(reply)
                }
            })
    }

    fn get_session(&self) -> impl Filter<Extract = (Reply,), Error = warp::Rejection> + Clone {
        let sessions = Arc::clone(&self.sessions);

        warp::path!("sessions" / u64)
            .and(warp::get())
            .and_then(move |id: u64| {
                let sessions = Arc::clone(&sessions);
                async move {
                    let reply = match sessions.with_session(id, |s| Ok(s.status())) {
                        Ok(status) => respond(StatusCode::OK, "Session found", to_value(&status)),
                        Err(err) => error_reply(&err),
                    };
                    Ok::<Reply, Infallible>(reply)
                }
            })
    }

    fn delete_session(&self) -> impl Filter<Extract = (Reply,), Error = warp::Rejection> + Clone {
        let sessions = Arc::clone(&self.sessions);

        warp::path!("sessions" / u64)
            .and(warp::delete())
            .and_then(move |id: u64| {
                let sessions = Arc::clone(&sessions);
                async move {
                    let reply = match sessions.remove(id) {
                        Ok(()) => respond(StatusCode::OK, "Session removed", None),
                        Err(err) => error_reply(&err),
                    };
                    Ok::<Reply, Infallible>(reply)
                }
            })
    }

    /// Telegrams for the time elapsed since the previous poll, at most `n`
    /// samples. Answers with a bare JSON array, which is what monitors read.
    fn get_data(&self) -> impl Filter<Extract = (Reply,), Error = warp::Rejection> + Clone {
        let sessions = Arc::clone(&self.sessions);

        warp::path!("sessions" / u64 / "data" / usize)
            .and(warp::get())
            .and_then(move |id: u64, n: usize| {
                let sessions = Arc::clone(&sessions);
                async move {
                    let now_ms = chrono::Utc::now().timestamp_millis();
                    let reply = match sessions.with_session(id, |s| s.sample(n, now_ms)) {
                        Ok(telegrams) => {
                            warp::reply::with_status(warp::reply::json(&telegrams), StatusCode::OK)
                        }
                        Err(err) => error_reply(&err),
                    };
                    Ok::<Reply, Infallible>(reply)
                }
            })
    }

    fn post_control(&self) -> impl Filter<Extract = (Reply,), Error = warp::Rejection> + Clone {
        let sessions = Arc::clone(&self.sessions);

        warp::path!("sessions" / u64 / "control")
            .and(warp::post())
            .and(warp::body::json())
            .and_then(move |id: u64, command: PircsCommand| {
                let sessions = Arc::clone(&sessions);
                async move {
                    let reply = match sessions.with_session(id, |s| Ok(s.control(&command))) {
                        Ok(ack) => warp::reply::with_status(warp::reply::json(&ack), StatusCode::OK),
                        Err(err) => error_reply(&err),
                    };
                    Ok::<Reply, Infallible>(reply)
                }
            })
    }

    fn post_scenario(&self) -> impl Filter<Extract = (Reply,), Error = warp::Rejection> + Clone {
        let max_iterations = self.sessions.config().max_iterations;

        warp::path!("scenario")
            .and(warp::post())
            .and(warp::body::json())
            .and_then(move |scenario: Scenario| async move {
                let result = tokio::task::spawn_blocking(move || {
                    let outcome = scenario.execute(max_iterations)?;
                    let telegrams = outcome.telegrams()?;
                    Ok::<_, SimError>(serde_json::json!({
                        "summary": outcome.summary,
                        "transitions": outcome.transitions,
                        "unprocessed_changes": outcome.unprocessed_changes,
                        "telegrams": telegrams,
                    }))
                })
                .await;

                let reply = match result {
                    Ok(Ok(data)) => respond(StatusCode::OK, "Scenario executed", Some(data)),
                    Ok(Err(err)) => error_reply(&err),
                    Err(join_error) => respond(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        &format!("Scenario task failed: {}", join_error),
                        None,
                    ),
                };
                Ok::<Reply, Infallible>(reply)
            })
    }
}

fn respond(code: StatusCode, message: &str, data: Option<serde_json::Value>) -> Reply {
    let response = ApiResponse {
        status: if code.is_success() { "success" } else { "error" }.to_string(),
        message: message.to_string(),
        data,
    };
    warp::reply::with_status(warp::reply::json(&response), code)
}

fn error_reply(err: &SimError) -> Reply {
    let code = match err {
        SimError::SessionNotFound(_) => StatusCode::NOT_FOUND,
        SimError::TooManySteps { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        _ => StatusCode::BAD_REQUEST,
    };
    respond(code, &err.to_string(), None)
}

fn to_value<T: Serialize>(value: &T) -> Option<serde_json::Value> {
    serde_json::to_value(value).ok()
}

use chrono::Utc;
use kameo::Actor;
use kameo::actor::ActorRef;
use kameo::error::Infallible;
use kameo::message::{Context, Message};
use kameo::reply::{Reply, ReplyError};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::actors::core::{ComponentHealth, HealthStatus};
use crate::utils::{CircuitBreaker, CircuitState};

// ============================================================================
// Health Monitor Actor - Aggregates component health
// ============================================================================
//
// Components push their status with `UpdateHealth`:
// - "intake"    - the Kafka consumer loop
// - "processor" - the inbox batch processor
// - "cache"     - sampled here from the Redis circuit breaker
//
// `GetSystemHealth` folds them into one overall status for `/health`.
//
// ============================================================================

// ============================================================================
// Messages
// ============================================================================

#[derive(Debug)]
pub struct UpdateHealth {
    pub component: String,
    pub status: HealthStatus,
    pub details: Option<String>,
}

#[derive(Debug)]
pub struct GetSystemHealth;

#[derive(Debug, Clone, Serialize)]
pub struct SystemHealth {
    pub overall_status: HealthStatus,
    pub components: HashMap<String, ComponentHealth>,
    pub check_time: chrono::DateTime<Utc>,
}

// Implement Reply for SystemHealth to use it as a message reply type
impl Reply for SystemHealth {
    type Ok = Self;
    type Error = Infallible;
    type Value = Self;

    fn to_result(self) -> Result<Self, Infallible> {
        Ok(self)
    }

    fn into_any_err(self) -> Option<Box<dyn ReplyError>> {
        None
    }

    fn into_value(self) -> Self::Value {
        self
    }
}

// ============================================================================
// Health Monitor Actor
// ============================================================================

pub struct HealthMonitorActor {
    components: HashMap<String, ComponentHealth>,
    cache_breaker: Option<CircuitBreaker>,
    check_interval: Duration,
}

impl HealthMonitorActor {
    pub fn new() -> Self {
        Self {
            components: HashMap::new(),
            cache_breaker: None,
            check_interval: Duration::from_secs(10),
        }
    }

    /// Sample this breaker periodically and report it as the "cache" component.
    pub fn with_cache_breaker(mut self, breaker: CircuitBreaker) -> Self {
        self.cache_breaker = Some(breaker);
        self
    }

    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    fn compute_overall_status(&self) -> HealthStatus {
        let mut has_degraded = false;
        let mut unhealthy_components = Vec::new();

        for (name, health) in &self.components {
            match &health.status {
                HealthStatus::Unhealthy(msg) => {
                    unhealthy_components.push(format!("{}: {}", name, msg));
                }
                HealthStatus::Degraded(_) => {
                    has_degraded = true;
                }
                HealthStatus::Healthy => {}
            }
        }

        if !unhealthy_components.is_empty() {
            unhealthy_components.sort();
            HealthStatus::Unhealthy(unhealthy_components.join(", "))
        } else if has_degraded {
            HealthStatus::Degraded("Some components degraded".to_string())
        } else {
            HealthStatus::Healthy
        }
    }
}

impl Default for HealthMonitorActor {
    fn default() -> Self {
        Self::new()
    }
}

fn circuit_status(state: CircuitState) -> HealthStatus {
    match state {
        CircuitState::Closed => HealthStatus::Healthy,
        CircuitState::HalfOpen => HealthStatus::Degraded("Circuit breaker half-open".to_string()),
        CircuitState::Open => HealthStatus::Unhealthy("Circuit breaker open".to_string()),
    }
}

impl Actor for HealthMonitorActor {
    type Args = Self;
    type Error = Infallible;

    async fn on_start(state: Self::Args, actor_ref: ActorRef<Self>) -> Result<Self, Self::Error> {
        tracing::info!("HealthMonitorActor started");

        if let Some(breaker) = state.cache_breaker.clone() {
            let actor_ref = actor_ref.clone();
            let period = state.check_interval;

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                loop {
                    interval.tick().await;

                    let status = circuit_status(breaker.get_state().await);

                    // Stops once the monitor is gone.
                    if actor_ref
                        .tell(UpdateHealth {
                            component: "cache".to_string(),
                            status,
                            details: Some(format!("circuit breaker '{}'", breaker.name())),
                        })
                        .send()
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
            });
        }

        Ok(state)
    }
}

// ============================================================================
// Message Handlers
// ============================================================================

impl Message<UpdateHealth> for HealthMonitorActor {
    type Reply = ();

    async fn handle(&mut self, msg: UpdateHealth, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        let changed = self
            .components
            .get(&msg.component)
            .map_or(true, |previous| previous.status != msg.status);

        if changed {
            match &msg.status {
                HealthStatus::Healthy => tracing::info!(component = %msg.component, "Component healthy"),
                HealthStatus::Degraded(reason) => {
                    tracing::warn!(component = %msg.component, reason = %reason, "Component degraded")
                }
                HealthStatus::Unhealthy(reason) => {
                    tracing::error!(component = %msg.component, reason = %reason, "Component unhealthy")
                }
            }
        }

        let health = ComponentHealth {
            name: msg.component.clone(),
            status: msg.status,
            last_check: Utc::now(),
            details: msg.details,
        };

        self.components.insert(msg.component, health);
    }
}

impl Message<GetSystemHealth> for HealthMonitorActor {
    type Reply = SystemHealth;

    async fn handle(&mut self, _msg: GetSystemHealth, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        SystemHealth {
            overall_status: self.compute_overall_status(),
            components: self.components.clone(),
            check_time: Utc::now(),
        }
    }
}

//! Business logic services

pub mod activity;
pub mod alerts;
pub mod audit;
pub mod email;
pub mod lifecycle;
pub mod notifier;
pub mod scans;
pub mod tools;
pub mod users;

use std::sync::Arc;

use crate::{clock::Clock, config::AppConfig, repository::Store};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn Store>,
    pub audit: audit::AuditLogger,
    pub tools: tools::ToolRegistry,
    pub users: users::UsersService,
    pub lifecycle: lifecycle::LifecycleEngine,
    pub alerts: alerts::AlertEvaluator,
    pub scans: scans::ScanService,
    pub activity: activity::ActivityService,
}

impl Services {
    /// Wire every service onto the given collaborators
    pub fn new(
        store: Arc<dyn Store>,
        notifier: Arc<dyn notifier::Notifier>,
        mailbox: Arc<dyn scans::ScanMailbox>,
        clock: Arc<dyn Clock>,
        config: &AppConfig,
    ) -> Self {
        let audit = audit::AuditLogger::new(store.clone(), clock.clone());
        let notifications = notifier::NotificationService::new(notifier, &config.notifier);

        Self {
            tools: tools::ToolRegistry::new(store.clone(), clock.clone(), audit.clone()),
            users: users::UsersService::new(store.clone(), clock.clone(), audit.clone()),
            lifecycle: lifecycle::LifecycleEngine::new(
                store.clone(),
                clock.clone(),
                audit.clone(),
                notifications.clone(),
            ),
            alerts: alerts::AlertEvaluator::new(
                store.clone(),
                clock.clone(),
                notifications.clone(),
                alerts::AlertPolicy::from(&config.alerts),
            ),
            scans: scans::ScanService::new(store.clone(), mailbox, clock.clone(), audit.clone()),
            activity: activity::ActivityService::new(store.clone(), clock, audit.clone(), notifications),
            audit,
            store,
        }
    }
}

//! Service directory shared by every hubkit app.
//!
//! The table is hand-curated and compiled in. There is no registration,
//! update or removal: callers only look entries up.

use serde::Serialize;

/// One sibling application in the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Service {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub icon: &'static str,
    pub color: &'static str,
    /// Whether the app is publicly launched.
    pub ready: bool,
}

impl Service {
    /// Mount path of the app, e.g. `/webtoon`.
    pub fn path(&self) -> String {
        format!("/{}", self.id)
    }
}

/// Every known app, in display order.
pub static SERVICES: &[Service] = &[
    Service {
        id: "webtoon",
        name: "Webtoon Board",
        description: "Share short stories and comics, comment on episodes, request cover previews",
        icon: "📖",
        color: "#6366F1",
        ready: true,
    },
    Service {
        id: "order",
        name: "Order Tracker",
        description: "Place physical-goods orders step by step and follow their status",
        icon: "📦",
        color: "#F59E0B",
        ready: false,
    },
    Service {
        id: "mentor",
        name: "AI Mentor",
        description: "Chat with mentor personas you design yourself",
        icon: "🧑‍🏫",
        color: "#10B981",
        ready: false,
    },
    Service {
        id: "jobs",
        name: "Job Board",
        description: "Aggregated job postings with location and remote filters",
        icon: "💼",
        color: "#3B82F6",
        ready: false,
    },
    Service {
        id: "remind",
        name: "Reminders",
        description: "Set goals, log walks and get push reminders",
        icon: "⏰",
        color: "#EF4444",
        ready: false,
    },
    Service {
        id: "recommend",
        name: "Recommendations",
        description: "Curated picks, and a place to suggest new ones",
        icon: "✨",
        color: "#EC4899",
        ready: false,
    },
];

/// The full directory.
pub fn services() -> &'static [Service] {
    SERVICES
}

/// Look up a service by id. Unknown ids yield `None`.
pub fn get_service_by_id(id: &str) -> Option<&'static Service> {
    SERVICES.iter().find(|s| s.id == id)
}

/// Launched services, in declaration order.
pub fn get_ready_services() -> Vec<&'static Service> {
    SERVICES.iter().filter(|s| s.ready).collect()
}

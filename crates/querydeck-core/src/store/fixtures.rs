//! Deterministic sample data for the demo server, benches and tests

use super::MemoryStore;
use chrono::{Duration, TimeZone, Utc};
use serde_json::json;

const TITLES: &[&str] = &[
    "Robotics Club",
    "Chess Tournament",
    "Debate Society",
    "Hackathon",
    "Science Fair",
    "Volunteer Tutoring",
    "Drama Production",
    "Math Olympiad",
];

const CATEGORIES: &[&str] = &["tech", "games", "speech", "community", "arts", "science"];
const STATUSES: &[&str] = &["approved", "pending", "rejected"];
const DEPARTMENTS: &[&str] = &["CS", "Physics", "History", "Biology"];

/// Summary of what [`seed_demo`] inserted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedSummary {
    pub users: usize,
    pub activities: usize,
    pub approvals: usize,
    pub portfolios: usize,
}

/// Fill `store` with `students` students, one faculty approver per
/// department and `activities` activities spread over the students
pub fn seed_demo(store: &MemoryStore, students: usize, activities: usize) -> SeedSummary {
    let epoch = Utc
        .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_default();
    let students = students.max(1);

    let student_ids: Vec<String> = (0..students)
        .map(|i| {
            store.insert(
                "users",
                json!({
                    "_id": format!("stu{:05}", i),
                    "name": format!("Student {}", i),
                    "email": format!("student{}@campus.edu", i),
                    "role": "student",
                    "department": DEPARTMENTS[i % DEPARTMENTS.len()],
                    "passwordHash": "redacted",
                }),
            )
        })
        .collect();

    let approvers: Vec<String> = DEPARTMENTS
        .iter()
        .enumerate()
        .map(|(i, dept)| {
            store.insert(
                "users",
                json!({
                    "_id": format!("fac{:05}", i),
                    "name": format!("Professor {}", dept),
                    "email": format!("faculty{}@campus.edu", i),
                    "role": "faculty",
                    "department": dept,
                }),
            )
        })
        .collect();

    for i in 0..activities {
        let created = epoch + Duration::hours(i as i64);
        let student = &student_ids[i % student_ids.len()];
        let status = STATUSES[i % STATUSES.len()];
        let activity_id = store.insert(
            "activities",
            json!({
                "_id": format!("act{:06}", i),
                "title": format!("{} #{}", TITLES[i % TITLES.len()], i),
                "description": format!(
                    "Participation record {} for {}. {}",
                    i,
                    TITLES[i % TITLES.len()],
                    "Details of the event, the role played and the outcome achieved. ".repeat(3)
                ),
                "studentId": student,
                "status": status,
                "category": CATEGORIES[i % CATEGORIES.len()],
                "startDate": (epoch + Duration::days((i % 365) as i64)).to_rfc3339(),
                "endDate": (epoch + Duration::days((i % 365) as i64 + 1)).to_rfc3339(),
                "attachments": (0..(i % 4)).map(|n| format!("proof-{}-{}.pdf", i, n)).collect::<Vec<_>>(),
                "createdAt": created.to_rfc3339(),
                "updatedAt": (created + Duration::minutes(30)).to_rfc3339(),
            }),
        );

        store.insert(
            "approvals",
            json!({
                "activityId": activity_id,
                "approverId": approvers[i % approvers.len()],
                "status": status,
                "createdAt": (created + Duration::hours(2)).to_rfc3339(),
            }),
        );
    }

    let portfolios = store.insert_many(
        "portfolios",
        student_ids.iter().map(|student| {
            json!({
                "studentId": student,
                "visibility": "private",
                "updatedAt": epoch.to_rfc3339(),
            })
        }),
    );

    SeedSummary {
        users: student_ids.len() + approvers.len(),
        activities,
        approvals: activities,
        portfolios,
    }
}

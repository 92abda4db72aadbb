use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "standard-user")]
    Standard,
    #[serde(rename = "service-desk-user")]
    ServiceDesk,
    #[serde(rename = "admin-user")]
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Standard => "standard-user",
            Role::ServiceDesk => "service-desk-user",
            Role::Admin => "admin-user",
        }
    }

    pub fn parse(value: &str) -> Option<Role> {
        match value {
            "standard-user" => Some(Role::Standard),
            "service-desk-user" => Some(Role::ServiceDesk),
            "admin-user" => Some(Role::Admin),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueStatus {
    Open,
    InProgress,
    Resolved,
}

impl IssueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueStatus::Open => "open",
            IssueStatus::InProgress => "in-progress",
            IssueStatus::Resolved => "resolved",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssuePriority {
    Low,
    Medium,
    High,
}

impl IssuePriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssuePriority::Low => "low",
            IssuePriority::Medium => "medium",
            IssuePriority::High => "high",
        }
    }

    pub fn parse(value: &str) -> Option<IssuePriority> {
        match value {
            "low" => Some(IssuePriority::Low),
            "medium" => Some(IssuePriority::Medium),
            "high" => Some(IssuePriority::High),
            _ => None,
        }
    }
}

// Database models

#[derive(Queryable, Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password: String,
    pub salt: String,
    pub role: String,
    pub office: String,
    pub workstation: String,
    pub country: String,
    pub phone_number: String,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::users)]
pub struct NewUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password: String,
    pub salt: String,
    pub role: String,
    pub office: String,
    pub workstation: String,
    pub country: String,
    pub phone_number: String,
}

// Profile self-edit: role deliberately absent so the endpoint cannot be used
// for privilege escalation.
#[derive(AsChangeset, Debug, Default)]
#[diesel(table_name = crate::schema::users)]
pub struct ProfileChangeset {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub country: Option<String>,
    pub office: Option<String>,
    pub workstation: Option<String>,
}

impl ProfileChangeset {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.email.is_none()
            && self.phone_number.is_none()
            && self.country.is_none()
            && self.office.is_none()
            && self.workstation.is_none()
    }
}

#[derive(AsChangeset, Debug, Default)]
#[diesel(table_name = crate::schema::users)]
pub struct UserChangeset {
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub office: Option<String>,
    pub workstation: Option<String>,
    pub country: Option<String>,
    pub phone_number: Option<String>,
}

impl UserChangeset {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.email.is_none()
            && self.role.is_none()
            && self.office.is_none()
            && self.workstation.is_none()
            && self.country.is_none()
            && self.phone_number.is_none()
    }
}

#[derive(Queryable, Debug, Clone)]
pub struct Issue {
    pub id: Uuid,
    pub description: String,
    pub image_url: Option<String>,
    pub status: String,
    pub priority: String,
    pub created_by_id: Uuid,
    pub created_by_name: String,
    pub created_by_email: String,
    pub assigned_to: Option<Uuid>,
    pub location: Option<serde_json::Value>,
    pub ai_metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::issues)]
pub struct NewIssue {
    pub id: Uuid,
    pub description: String,
    pub image_url: Option<String>,
    pub status: String,
    pub priority: String,
    pub created_by_id: Uuid,
    pub created_by_name: String,
    pub created_by_email: String,
    pub location: Option<serde_json::Value>,
    pub ai_metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(AsChangeset, Debug)]
#[diesel(table_name = crate::schema::issues)]
pub struct IssueChangeset {
    pub description: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub assigned_to: Option<Uuid>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Queryable, Debug, Clone)]
pub struct Office {
    pub id: Uuid,
    pub name: String,
    pub country: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::offices)]
pub struct NewOffice {
    pub id: Uuid,
    pub name: String,
    pub country: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(AsChangeset, Debug)]
#[diesel(table_name = crate::schema::offices)]
pub struct OfficeChangeset {
    pub name: Option<String>,
    pub country: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Queryable, Debug, Clone)]
pub struct ChatMessage {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub sender_name: String,
    pub sender_role: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub read: bool,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::chat_messages)]
pub struct NewChatMessage {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub sender_name: String,
    pub sender_role: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub read: bool,
}

// Issue payload fragments stored as JSONB

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct IssueLocation {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Detection {
    pub name: String,
    pub confidence: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AiMetadata {
    pub labels: Vec<Detection>,
    pub objects: Vec<Detection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_description: Option<String>,
}

// DTOs

#[derive(Deserialize, Debug)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub exp: usize,
    pub iat: usize,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ProfileApi {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone_number: String,
    pub country: String,
    pub office: String,
    pub workstation: String,
    pub role: String,
}

impl From<&User> for ProfileApi {
    fn from(user: &User) -> Self {
        ProfileApi {
            id: user.id.to_string(),
            name: user.name.clone(),
            email: user.email.clone(),
            phone_number: user.phone_number.clone(),
            country: user.country.clone(),
            office: user.office.clone(),
            workstation: user.workstation.clone(),
            role: user.role.clone(),
        }
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdateRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub country: Option<String>,
    pub office: Option<String>,
    pub workstation: Option<String>,
}

impl ProfileUpdateRequest {
    pub fn into_changeset(self) -> ProfileChangeset {
        ProfileChangeset {
            name: self.name,
            email: self.email,
            phone_number: self.phone_number,
            country: self.country,
            office: self.office,
            workstation: self.workstation,
        }
    }
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreatedByApi {
    pub user_id: String,
    pub name: String,
    pub email: String,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct IssueApi {
    pub id: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub status: String,
    pub priority: String,
    pub created_by: CreatedByApi,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Issue> for IssueApi {
    fn from(issue: Issue) -> Self {
        IssueApi {
            id: issue.id.to_string(),
            description: issue.description,
            image_url: issue.image_url,
            status: issue.status,
            priority: issue.priority,
            created_by: CreatedByApi {
                user_id: issue.created_by_id.to_string(),
                name: issue.created_by_name,
                email: issue.created_by_email,
            },
            assigned_to: issue.assigned_to.map(|id| id.to_string()),
            location: issue.location,
            ai_metadata: issue.ai_metadata,
            created_at: issue.created_at,
            updated_at: issue.updated_at,
        }
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct IssueUpdateRequest {
    pub description: Option<String>,
    pub status: Option<IssueStatus>,
    pub priority: Option<IssuePriority>,
    pub assigned_to: Option<Uuid>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
    pub office: String,
    pub workstation: Option<String>,
    pub country: Option<String>,
    pub phone_number: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<Role>,
    pub office: Option<String>,
    pub workstation: Option<String>,
    pub country: Option<String>,
    pub phone_number: Option<String>,
}

impl UpdateUserRequest {
    pub fn into_changeset(self) -> UserChangeset {
        UserChangeset {
            name: self.name,
            email: self.email,
            role: self.role.map(|r| r.as_str().to_string()),
            office: self.office,
            workstation: self.workstation,
            country: self.country,
            phone_number: self.phone_number,
        }
    }
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UserApi {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: String,
    pub office: String,
    pub workstation: String,
    pub country: String,
    pub phone_number: String,
}

impl From<&User> for UserApi {
    fn from(user: &User) -> Self {
        UserApi {
            id: user.id.to_string(),
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role.clone(),
            office: user.office.clone(),
            workstation: user.workstation.clone(),
            country: user.country.clone(),
            phone_number: user.phone_number.clone(),
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct CreateOfficeRequest {
    pub name: String,
    pub country: String,
}

#[derive(Deserialize, Debug, Default)]
pub struct UpdateOfficeRequest {
    pub name: Option<String>,
    pub country: Option<String>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct OfficeApi {
    pub id: String,
    pub name: String,
    pub country: String,
    pub created_at: DateTime<Utc>,
}

impl From<&Office> for OfficeApi {
    fn from(office: &Office) -> Self {
        OfficeApi {
            id: office.id.to_string(),
            name: office.name.clone(),
            country: office.country.clone(),
            created_at: office.created_at,
        }
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub message: String,
    pub conversation_id: Option<Uuid>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessageApi {
    pub id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub sender_role: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub read: bool,
}

impl From<&ChatMessage> for ChatMessageApi {
    fn from(msg: &ChatMessage) -> Self {
        ChatMessageApi {
            id: msg.id.to_string(),
            sender_id: msg.sender_id.to_string(),
            sender_name: msg.sender_name.clone(),
            sender_role: msg.sender_role.clone(),
            message: msg.message.clone(),
            created_at: msg.created_at,
            read: msg.read,
        }
    }
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ConversationUserApi {
    pub id: String,
    pub name: String,
    pub email: String,
    pub office: String,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ConversationApi {
    pub conversation_id: String,
    pub user: ConversationUserApi,
    pub last_message: String,
    pub last_message_time: DateTime<Utc>,
    pub unread_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_wire_names() {
        for role in [Role::Standard, Role::ServiceDesk, Role::Admin] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("superuser"), None);
    }

    #[test]
    fn role_serde_uses_kebab_names() {
        assert_eq!(
            serde_json::to_string(&Role::ServiceDesk).unwrap(),
            "\"service-desk-user\""
        );
        let parsed: Role = serde_json::from_str("\"admin-user\"").unwrap();
        assert_eq!(parsed, Role::Admin);
    }

    #[test]
    fn issue_status_serde_matches_store_values() {
        let parsed: IssueStatus = serde_json::from_str("\"in-progress\"").unwrap();
        assert_eq!(parsed, IssueStatus::InProgress);
        assert_eq!(parsed.as_str(), "in-progress");
        assert!(serde_json::from_str::<IssueStatus>("\"closed\"").is_err());
    }

    #[test]
    fn empty_profile_update_is_detected() {
        let req = ProfileUpdateRequest::default();
        assert!(req.into_changeset().is_empty());

        let req = ProfileUpdateRequest {
            office: Some("Malaga".to_string()),
            ..Default::default()
        };
        assert!(!req.into_changeset().is_empty());
    }

    #[test]
    fn issue_api_stringifies_ids_and_keeps_snapshot() {
        let issue = Issue {
            id: Uuid::new_v4(),
            description: "Broken chair".to_string(),
            image_url: None,
            status: "open".to_string(),
            priority: "medium".to_string(),
            created_by_id: Uuid::new_v4(),
            created_by_name: "Juan".to_string(),
            created_by_email: "standard@test.com".to_string(),
            assigned_to: None,
            location: None,
            ai_metadata: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let expected_id = issue.id.to_string();
        let expected_creator = issue.created_by_id.to_string();
        let api = IssueApi::from(issue);
        assert_eq!(api.id, expected_id);
        assert_eq!(api.created_by.user_id, expected_creator);
        assert_eq!(api.created_by.name, "Juan");
        assert!(api.assigned_to.is_none());
    }

    #[test]
    fn location_deserializes_from_client_json() {
        let loc: IssueLocation =
            serde_json::from_str(r#"{"latitude":36.72,"longitude":-4.42,"accuracy":12.5}"#)
                .unwrap();
        assert_eq!(loc.latitude, 36.72);
        assert_eq!(loc.accuracy, Some(12.5));
        assert!(loc.timestamp.is_none());
    }
}

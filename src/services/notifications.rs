use std::fmt::Write as _;
use std::sync::Arc;

use tracing::{error, info};

use super::require_admin;
use crate::error::{ServiceError, ServiceResult};
use crate::mailer::{EmailMessage, Mailer};
use crate::models::{DocumentRecord, Profile, ProfileRole};
use crate::records::RecordStore;

pub const STATUS_EMAIL_SUBJECT: &str = "Update on Your Document Verification";

const CELL: &str = "padding: 10px; border: 1px solid #eee;";
const LABEL_CELL: &str =
    "padding: 10px; border: 1px solid #eee; background-color: #f9f9f9; width: 30%;";
const HEADER_CELL: &str = "padding: 10px; border: 1px solid #ddd; text-align: left;";

#[derive(Clone)]
pub struct NotificationService {
    records: Arc<dyn RecordStore>,
    mailer: Arc<dyn Mailer>,
    from: String,
}

impl NotificationService {
    pub fn new(records: Arc<dyn RecordStore>, mailer: Arc<dyn Mailer>, from: String) -> Self {
        Self {
            records,
            mailer,
            from,
        }
    }

    /// Emails the student a summary of every document's current status. Not retried.
    pub async fn send_status_email(&self, caller_id: &str, student_id: &str) -> ServiceResult<()> {
        let admin = require_admin(self.records.as_ref(), caller_id).await?;
        let student = self
            .records
            .get_profile(student_id, ProfileRole::Student)
            .await
            .map_err(ServiceError::upstream("failed to load student profile"))?
            .ok_or(ServiceError::NotFound("student"))?;

        if student.college_id != admin.college_id {
            return Err(ServiceError::forbidden("student belongs to another college"));
        }

        let documents = self
            .records
            .documents_by_owner(student_id)
            .await
            .map_err(ServiceError::upstream("failed to load student documents"))?;

        let message = EmailMessage {
            from: self.from.clone(),
            to: student.email.clone(),
            subject: STATUS_EMAIL_SUBJECT.to_string(),
            html: render_status_email(&student, &documents),
        };

        self.mailer.send(&message).await.map_err(|err| {
            error!(error = %err, student_id = %student_id, "failed to send status email");
            ServiceError::upstream("failed to send status email")(err)
        })?;

        info!(
            student_id = %student_id,
            documents = documents.len(),
            sent_by = %caller_id,
            "status email sent"
        );
        Ok(())
    }
}

pub fn render_status_email(student: &Profile, documents: &[DocumentRecord]) -> String {
    let first_name = student.name.split_whitespace().next().unwrap_or_default();

    let mut rows = String::new();
    for document in documents {
        let _ = write!(
            rows,
            r#"
        <tr>
          <td style="{CELL}">{}</td>
          <td style="{CELL} text-transform: capitalize;">{}</td>
          <td style="{CELL}">{}</td>
        </tr>"#,
            escape_html(&document.original_name),
            document.status,
            escape_html(&document.remark),
        );
    }

    let mut details = String::new();
    for (label, value) in [
        ("Student Name", &student.name),
        ("PRN", &student.prn),
        ("Email", &student.email),
        ("College", &student.college_name),
    ] {
        let _ = write!(
            details,
            r#"
          <tr>
            <td style="{LABEL_CELL}"><strong>{label}</strong></td>
            <td style="{CELL}">{}</td>
          </tr>"#,
            escape_html(value),
        );
    }

    format!(
        r#"<div style="font-family: Arial, sans-serif; line-height: 1.6; color: #333;">
  <h1 style="color: #4A5568;">Document Status Update</h1>
  <p>Hello {first_name},</p>
  <p>Your profile and document verification status has been updated by your college admin.</p>

  <h2 style="color: #333;">Your Profile Details</h2>
  <table style="width: 100%; border-collapse: collapse; margin-bottom: 25px; font-size: 14px;">
    <tbody>{details}
    </tbody>
  </table>

  <h2 style="color: #333;">Document Status</h2>
  <table style="width: 100%; border-collapse: collapse; font-size: 14px;">
    <thead>
      <tr style="background-color: #f9f9f9;">
        <th style="{HEADER_CELL}">File Name</th>
        <th style="{HEADER_CELL}">Status</th>
        <th style="{HEADER_CELL}">Admin Remarks</th>
      </tr>
    </thead>
    <tbody>{rows}
    </tbody>
  </table>
  <p style="margin-top: 20px;">If any documents are rejected, please delete them from your dashboard and upload a corrected version.</p>
  <p>Thank you.</p>
  <p style="font-size: 12px; color: #777;">Note: This is an auto-generated email. Please do not reply.</p>
</div>
"#,
        first_name = escape_html(first_name),
    )
}

fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;
    use crate::models::DocumentStatus;

    fn student() -> Profile {
        Profile {
            user_id: "uid-1".into(),
            role: ProfileRole::Student,
            email: "asha@example.edu".into(),
            name: "Asha Rao".into(),
            prn: "PRN-7".into(),
            college_name: "North College".into(),
            college_id: "north".into(),
            additional_info: String::new(),
            created_at: Utc::now(),
        }
    }

    fn document(name: &str, status: DocumentStatus, remark: &str) -> DocumentRecord {
        DocumentRecord {
            document_id: Uuid::new_v4(),
            owner_id: "uid-1".into(),
            college_id: "north".into(),
            object_key: format!("students/uid-1/x_{name}"),
            original_name: name.into(),
            content_type: None,
            status,
            remark: remark.into(),
            uploaded_at: Utc::now(),
            reviewed_at: None,
            reviewed_by: None,
        }
    }

    #[test]
    fn greets_by_first_name_and_lists_each_document() {
        let html = render_status_email(
            &student(),
            &[
                document("transcript.pdf", DocumentStatus::Verified, ""),
                document("id-card.png", DocumentStatus::Rejected, "blurry scan"),
            ],
        );
        assert!(html.contains("Hello Asha,"));
        assert!(html.contains("transcript.pdf"));
        assert!(html.contains(">verified<"));
        assert!(html.contains(">rejected<"));
        assert!(html.contains("blurry scan"));
        assert!(html.contains("North College"));
    }

    #[test]
    fn escapes_user_supplied_text() {
        let html = render_status_email(
            &student(),
            &[document(
                "<script>.pdf",
                DocumentStatus::Rejected,
                "use \"A&B\" form",
            )],
        );
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;.pdf"));
        assert!(html.contains("use &quot;A&amp;B&quot; form"));
    }
}

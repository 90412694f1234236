//! crates/quiz_platform_core/src/access.rs
//!
//! Role and ownership guards shared by the services. All of them run before
//! any mutation.

use crate::domain::{Quiz, QuizSession, Role, User};
use crate::error::{CoreError, CoreResult};
use crate::ports::DatabaseService;

pub fn ensure_active(user: &User) -> CoreResult<()> {
    if user.is_active {
        Ok(())
    } else {
        Err(CoreError::Forbidden("This account has been deactivated".to_string()))
    }
}

pub fn ensure_role(user: &User, role: Role) -> CoreResult<()> {
    ensure_active(user)?;
    if user.role == role {
        Ok(())
    } else {
        Err(CoreError::Forbidden(format!("Only a {} may do this", role)))
    }
}

pub fn ensure_session_owner(user: &User, session: &QuizSession) -> CoreResult<()> {
    if session.user_id == user.id {
        Ok(())
    } else {
        Err(CoreError::Forbidden("This session does not belong to you".to_string()))
    }
}

/// Loads a quiz and checks that `teacher` created it.
pub async fn owned_quiz(db: &dyn DatabaseService, teacher: &User, quiz_id: &str) -> CoreResult<Quiz> {
    ensure_role(teacher, Role::Teacher)?;
    let quiz = db.get_quiz(quiz_id).await?;
    if quiz.owner_id != teacher.id {
        return Err(CoreError::Forbidden("You do not own this quiz".to_string()));
    }
    Ok(quiz)
}

mod common;

use common::{multiple_draft, quiz_draft, Platform};
use quiz_platform_core::domain::{
    AuditFilter, Difficulty, GeneratedQuestion, GenerationParams, NewAvatar, QuestionKind,
    Rarity, Role, Visibility,
};
use quiz_platform_core::CoreError;
use rust_decimal_macros::dec;
use std::sync::atomic::Ordering;

//=========================================================================================
// Users
//=========================================================================================

#[tokio::test]
async fn registration_allocates_role_prefixed_ids_and_is_idempotent() {
    let platform = Platform::new();
    let teacher = platform.register("Guru", Role::Teacher).await;
    let student = platform.register("Budi", Role::Student).await;
    assert_eq!(teacher.id, "TE001");
    assert_eq!(student.id, "ST001");
    assert_eq!(student.subscription_id, "SB001");
    assert_eq!(student.points, 0);

    let identity = platform.users.identify("token-Budi").await.unwrap();
    let again = platform.users.register_user(&identity, Role::Student).await.unwrap();
    assert_eq!(again.id, student.id);

    let claims = platform.identity.role_claims.lock().unwrap().clone();
    assert!(claims.contains(&("ext-Budi".to_string(), Role::Student)));
}

#[tokio::test]
async fn admins_cannot_self_register() {
    let platform = Platform::new();
    let identity = platform.identity.add("token-x", "ext-x", "Mallory");
    let result = platform.users.register_user(&identity, Role::Admin).await;
    assert!(matches!(result, Err(CoreError::Forbidden(_))));
}

#[tokio::test]
async fn registration_survives_identity_provider_outage() {
    let platform = Platform::new();
    platform.identity.fail_role_sync.store(true, Ordering::SeqCst);
    let user = platform.register("Budi", Role::Student).await;
    assert_eq!(user.role, Role::Student);
}

#[tokio::test]
async fn authentication_distinguishes_bad_tokens_unregistered_and_inactive_users() {
    let platform = Platform::new();
    let admin = platform.admin("Root").await;
    let student = platform.register("Budi", Role::Student).await;

    let bad = platform.users.authenticate("nope").await;
    assert!(matches!(bad, Err(CoreError::Forbidden(_))));

    platform.identity.add("token-new", "ext-new", "Newcomer");
    let unregistered = platform.users.authenticate("token-new").await;
    assert!(matches!(unregistered, Err(CoreError::NotFound(_))));

    let ok = platform.users.authenticate("token-Budi").await.unwrap();
    assert_eq!(ok.id, student.id);

    platform
        .users
        .set_user_active(&admin, &student.id, false)
        .await
        .unwrap();
    let inactive = platform.users.authenticate("token-Budi").await;
    assert!(matches!(inactive, Err(CoreError::Forbidden(_))));
}

#[tokio::test]
async fn role_changes_are_admin_only_and_synced() {
    let platform = Platform::new();
    let admin = platform.admin("Root").await;
    let student = platform.register("Budi", Role::Student).await;

    let denied = platform
        .users
        .change_user_role(&student, &student.id, Role::Teacher)
        .await;
    assert!(matches!(denied, Err(CoreError::Forbidden(_))));

    let changed = platform
        .users
        .change_user_role(&admin, &student.id, Role::Teacher)
        .await
        .unwrap();
    assert_eq!(changed.role, Role::Teacher);
    let claims = platform.identity.role_claims.lock().unwrap().clone();
    assert_eq!(claims.last(), Some(&("ext-Budi".to_string(), Role::Teacher)));

    let demote_self = platform
        .users
        .change_user_role(&admin, &admin.id, Role::Student)
        .await;
    assert!(matches!(demote_self, Err(CoreError::Conflict(_))));
}

//=========================================================================================
// Quizzes
//=========================================================================================

#[tokio::test]
async fn join_codes_are_unique_and_case_insensitive_on_lookup() {
    let platform = Platform::new();
    let teacher = platform.register("Guru", Role::Teacher).await;

    let quiz = platform
        .quizzes
        .create_quiz(&teacher, quiz_draft("Algebra", Some("alg01"), Visibility::Private))
        .await
        .unwrap();
    assert_eq!(quiz.id, "QZ001");
    assert_eq!(quiz.code.as_deref(), Some("ALG01"));

    let clash = platform
        .quizzes
        .create_quiz(&teacher, quiz_draft("Algebra II", Some("ALG01"), Visibility::Public))
        .await;
    assert!(matches!(clash, Err(CoreError::Conflict(_))));

    let found = platform.quizzes.find_quiz_by_code("alg01").await.unwrap();
    assert_eq!(found.id, quiz.id);
    let missing = platform.quizzes.find_quiz_by_code("NOPE1").await;
    assert!(matches!(missing, Err(CoreError::NotFound(_))));
}

#[tokio::test]
async fn private_quizzes_are_listed_only_for_their_owner() {
    let platform = Platform::new();
    let owner = platform.register("Guru", Role::Teacher).await;
    let student = platform.register("Budi", Role::Student).await;
    platform
        .quizzes
        .create_quiz(&owner, quiz_draft("Open", None, Visibility::Public))
        .await
        .unwrap();
    platform
        .quizzes
        .create_quiz(&owner, quiz_draft("Secret", None, Visibility::Private))
        .await
        .unwrap();

    assert_eq!(platform.quizzes.list_quizzes(&owner).await.unwrap().len(), 2);
    let visible = platform.quizzes.list_quizzes(&student).await.unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].title, "Open");
}

#[tokio::test]
async fn only_the_owner_edits_a_quiz() {
    let platform = Platform::new();
    let owner = platform.register("Guru", Role::Teacher).await;
    let other = platform.register("Dosen", Role::Teacher).await;
    let student = platform.register("Budi", Role::Student).await;
    let quiz = platform.quiz(&owner, "Math").await;

    let denied = platform
        .quizzes
        .add_question(&other, &quiz.id, multiple_draft("2 + 2?", "4", &["3"]))
        .await;
    assert!(matches!(denied, Err(CoreError::Forbidden(_))));
    let by_student = platform
        .quizzes
        .create_quiz(&student, quiz_draft("Mine", None, Visibility::Public))
        .await;
    assert!(matches!(by_student, Err(CoreError::Forbidden(_))));

    let q = platform.multiple(&owner, &quiz.id, "2 + 2?", "4", &["3"]).await;
    let updated = platform
        .quizzes
        .update_question(&owner, &q, multiple_draft("2 + 3?", "5", &["4", "6"]))
        .await
        .unwrap();
    assert_eq!(updated.correct_answer, "5");
    assert_eq!(updated.incorrect_answers.len(), 2);

    let renamed = platform
        .quizzes
        .update_quiz(&owner, &quiz.id, quiz_draft("Math 101", None, Visibility::Public))
        .await
        .unwrap();
    assert_eq!(renamed.title, "Math 101");
}

#[tokio::test]
async fn deleting_a_quiz_removes_its_questions_and_sessions() {
    let platform = Platform::new();
    let owner = platform.register("Guru", Role::Teacher).await;
    let student = platform.register("Budi", Role::Student).await;
    let quiz = platform.quiz(&owner, "Math").await;
    let q = platform.multiple(&owner, &quiz.id, "2 + 2?", "4", &["3"]).await;
    let session = platform
        .sessions
        .start_quiz_session(&student, &quiz.id)
        .await
        .unwrap()
        .into_session();

    platform.quizzes.delete_quiz(&owner, &quiz.id).await.unwrap();

    let questions = platform.quizzes.list_quiz_questions(&owner, &quiz.id).await;
    assert!(matches!(questions, Err(CoreError::NotFound(_))));
    let answer = platform.sessions.submit_answer(&student, session.id, &q, "4").await;
    assert!(matches!(answer, Err(CoreError::NotFound(_))));
}

#[tokio::test]
async fn generated_questions_are_validated_and_flagged() {
    let platform = Platform::with_generator(GeneratedQuestion {
        question: "Which planet is largest?".to_string(),
        correct_answer: "Jupiter".to_string(),
        incorrect_answers: vec!["Mars".to_string(), "Venus".to_string(), "Earth".to_string()],
        explanation: Some("Jupiter is a gas giant.".to_string()),
    });
    let teacher = platform.register("Guru", Role::Teacher).await;
    let quiz = platform.quiz(&teacher, "Space").await;

    let question = platform
        .quizzes
        .generate_question(
            &teacher,
            &quiz.id,
            GenerationParams {
                topic: "planets".to_string(),
                kind: QuestionKind::Multiple,
                difficulty: Difficulty::Easy,
                style: None,
            },
        )
        .await
        .unwrap();
    assert!(question.generated);
    assert_eq!(question.correct_answer, "Jupiter");
    assert!(question.text.contains("planets"));
}

#[tokio::test]
async fn generation_without_a_generator_is_unavailable() {
    let platform = Platform::new();
    let teacher = platform.register("Guru", Role::Teacher).await;
    let quiz = platform.quiz(&teacher, "Space").await;
    let result = platform
        .quizzes
        .generate_question(
            &teacher,
            &quiz.id,
            GenerationParams {
                topic: "planets".to_string(),
                kind: QuestionKind::Multiple,
                difficulty: Difficulty::Easy,
                style: None,
            },
        )
        .await;
    assert!(matches!(result, Err(CoreError::UpstreamUnavailable(_))));
}

//=========================================================================================
// Shop
//=========================================================================================

#[tokio::test]
async fn insufficient_points_rejects_without_mutation() {
    let platform = Platform::new();
    let student = platform.register("Budi", Role::Student).await;
    let avatar = platform.avatar("Fox", dec!(100)).await;
    platform.store.add_points(&student.id, 40).await.unwrap();

    let result = platform.shop.buy_avatar_with_points(&student, &avatar).await;
    assert!(matches!(result, Err(CoreError::Conflict(_))));

    let user = platform.users.current_user(&student.id).await.unwrap();
    assert_eq!(user.points, 40);
    assert!(platform.shop.list_owned_avatars(&student).await.unwrap().is_empty());
}

#[tokio::test]
async fn points_purchase_debits_once() {
    let platform = Platform::new();
    let student = platform.register("Budi", Role::Student).await;
    let avatar = platform.avatar("Fox", dec!(100)).await;
    platform.store.add_points(&student.id, 250).await.unwrap();

    let user = platform
        .shop
        .buy_avatar_with_points(&student, &avatar)
        .await
        .unwrap();
    assert_eq!(user.points, 150);

    let again = platform.shop.buy_avatar_with_points(&student, &avatar).await;
    assert!(matches!(again, Err(CoreError::Conflict(_))));
    let user = platform.users.current_user(&student.id).await.unwrap();
    assert_eq!(user.points, 150);

    let equipped = platform.users.equip_avatar(&student, &avatar).await.unwrap();
    assert_eq!(equipped.active_avatar_id.as_deref(), Some(avatar.as_str()));
}

#[tokio::test]
async fn avatars_must_be_owned_to_equip() {
    let platform = Platform::new();
    let student = platform.register("Budi", Role::Student).await;
    let avatar = platform.avatar("Fox", dec!(100)).await;
    let result = platform.users.equip_avatar(&student, &avatar).await;
    assert!(matches!(result, Err(CoreError::Forbidden(_))));
}

#[tokio::test]
async fn retired_avatars_leave_the_shop() {
    let platform = Platform::new();
    let admin = platform.admin("Root").await;
    let student = platform.register("Budi", Role::Student).await;

    let avatar = platform
        .shop
        .create_avatar(
            &admin,
            NewAvatar {
                name: " Dragon ".to_string(),
                price: dec!(50000.00),
                rarity: Rarity::Legendary,
            },
        )
        .await
        .unwrap();
    assert_eq!(avatar.name, "Dragon");

    platform
        .shop
        .set_avatar_active(&admin, &avatar.id, false)
        .await
        .unwrap();
    assert!(platform.shop.list_avatars(&student).await.unwrap().is_empty());
    assert_eq!(platform.shop.list_avatars(&admin).await.unwrap().len(), 1);

    platform.store.add_points(&student.id, 100_000).await.unwrap();
    let result = platform.shop.buy_avatar_with_points(&student, &avatar.id).await;
    assert!(matches!(result, Err(CoreError::NotFound(_))));

    let denied = platform
        .shop
        .create_avatar(
            &student,
            NewAvatar {
                name: "Cat".to_string(),
                price: dec!(1),
                rarity: Rarity::Common,
            },
        )
        .await;
    assert!(matches!(denied, Err(CoreError::Forbidden(_))));
}

#[tokio::test]
async fn avatar_prices_must_be_whole_rupiah() {
    let platform = Platform::new();
    let admin = platform.admin("Root").await;

    let fractional = platform
        .shop
        .create_avatar(
            &admin,
            NewAvatar {
                name: "Owl".to_string(),
                price: dec!(15000.50),
                rarity: Rarity::Epic,
            },
        )
        .await;
    assert!(matches!(fractional, Err(CoreError::Validation(_))));

    let negative = platform
        .shop
        .create_avatar(
            &admin,
            NewAvatar {
                name: "Owl".to_string(),
                price: dec!(-1),
                rarity: Rarity::Epic,
            },
        )
        .await;
    assert!(matches!(negative, Err(CoreError::Validation(_))));

    let whole = platform
        .shop
        .create_avatar(
            &admin,
            NewAvatar {
                name: "Owl".to_string(),
                price: dec!(15000.00),
                rarity: Rarity::Epic,
            },
        )
        .await
        .unwrap();
    assert_eq!(whole.price, dec!(15000));
    assert_eq!(platform.shop.list_avatars(&admin).await.unwrap().len(), 1);
}

#[tokio::test]
async fn seeded_tiers_are_listed() {
    let platform = Platform::new();
    let tiers = platform.shop.list_subscription_tiers().await.unwrap();
    let ids: Vec<&str> = tiers.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["SB001", "SB002"]);
    assert_eq!(tiers[1].price, dec!(49000.00));
}

//=========================================================================================
// Audit
//=========================================================================================

#[tokio::test]
async fn audit_search_is_admin_only_and_filtered() {
    let platform = Platform::new();
    let admin = platform.admin("Root").await;
    let student = platform.register("Budi", Role::Student).await;
    let teacher = platform.register("Guru", Role::Teacher).await;
    platform.quiz(&teacher, "Math").await;

    let denied = platform.audit.search(&student, AuditFilter::default()).await;
    assert!(matches!(denied, Err(CoreError::Forbidden(_))));

    let all = platform.audit.search(&admin, AuditFilter::default()).await.unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(all[0].action, "quiz.create");

    let registrations = platform
        .audit
        .search(
            &admin,
            AuditFilter {
                action: Some("user.register".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(registrations.len(), 2);

    let by_teacher = platform
        .audit
        .search(
            &admin,
            AuditFilter {
                actor_id: Some(teacher.id.clone()),
                entity: Some("quiz".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(by_teacher.len(), 1);
    assert_eq!(by_teacher[0].entity_id, "QZ001");

    let limited = platform
        .audit
        .search(
            &admin,
            AuditFilter {
                limit: Some(1),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(limited.len(), 1);
}

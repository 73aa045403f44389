use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;
use warden_authz::{Effect, NewGroup, TenantId};
use warden_server::{AppConfig, AppState, build_app};

struct TestApp {
    app: Router,
    state: AppState,
    admin: Uuid,
}

impl TestApp {
    async fn new() -> Self {
        let admin = Uuid::new_v4();
        let mut cfg = AppConfig::default();
        cfg.authz.token.secret = "an-api-test-secret-that-is-long-enough".into();
        cfg.bootstrap.admin_principal = Some(admin);

        let (state, report) = AppState::init(&cfg).await.expect("init state");
        assert_eq!(report.admin, Some(admin));
        let app = build_app(state.clone(), &cfg);
        Self { app, state, admin }
    }

    async fn token(&self, principal: Uuid, tenant: &str) -> String {
        let (_, token) = self
            .state
            .tokens
            .issue(principal, &TenantId::new(tenant))
            .await
            .expect("issue token");
        token
    }

    async fn admin_token(&self) -> String {
        let tenant = self.state.grants.global_tenant().as_str().to_string();
        self.token(self.admin, &tenant).await
    }

    async fn send(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    /// A principal whose only grants come from a group in `tenant`, with a
    /// token for that tenant.
    async fn tenant_admin(&self, tenant: &str, grants: &[(&str, &str)]) -> (Uuid, String) {
        let store = self.state.grants.store();
        let principal = self
            .state
            .grants
            .register_principal(None, "tenant admin")
            .await
            .unwrap();
        let group = self
            .state
            .grants
            .create_group(NewGroup::new(format!("{tenant}_admins"), TenantId::new(tenant)))
            .await
            .unwrap();
        for (resource, action) in grants {
            let permission = store
                .find_permission_by_key(resource, action)
                .await
                .unwrap()
                .expect("built-in permission");
            self.state
                .grants
                .assign_group_permission(group.id, permission.id, Effect::Allow, None)
                .await
                .unwrap();
        }
        self.state
            .grants
            .add_group_member(principal.id, group.id, TenantId::new(tenant))
            .await
            .unwrap();
        let token = self.token(principal.id, tenant).await;
        (principal.id, token)
    }

    async fn super_admin_group(&self) -> Uuid {
        self.state
            .grants
            .store()
            .find_group_by_name("super_admin", self.state.grants.global_tenant())
            .await
            .unwrap()
            .expect("super_admin group")
            .id
    }

    fn id(value: &Value) -> String {
        value["id"].as_str().expect("id").to_string()
    }
}

#[tokio::test]
async fn health_is_public() {
    let t = TestApp::new().await;
    let (status, body) = t.send("GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn missing_token_is_unauthorized() {
    let t = TestApp::new().await;
    let (status, body) = t.send("GET", "/groups", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");

    let (status, _) = t
        .send("GET", "/me/permissions", Some("not-a-token"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_manages_groups_in_any_tenant() {
    let t = TestApp::new().await;
    let admin = t.admin_token().await;

    let (status, group) = t
        .send(
            "POST",
            "/groups",
            Some(&admin),
            Some(json!({ "name": "nurses", "tenant": "acme" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(group["tenant"], "acme");

    let (status, groups) = t.send("GET", "/groups?tenant=acme", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(groups.as_array().unwrap().len(), 1);

    let (status, _) = t
        .send(
            "DELETE",
            &format!("/groups/{}", TestApp::id(&group)),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn principal_without_grants_is_forbidden() {
    let t = TestApp::new().await;
    let user = t
        .state
        .grants
        .register_principal(None, "dana")
        .await
        .unwrap();
    let token = t.token(user.id, "acme").await;

    let (status, body) = t
        .send("POST", "/groups", Some(&token), Some(json!({ "name": "x" })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");

    let (status, body) = t.send("GET", "/me/permissions", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["principalId"], user.id.to_string());
    assert!(body["permissions"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn admin_snapshot_lists_manage_permissions() {
    let t = TestApp::new().await;
    let admin = t.admin_token().await;

    let (status, body) = t.send("GET", "/me/permissions", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    let permissions: Vec<&str> = body["permissions"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert!(permissions.contains(&"group:manage"));
    assert!(permissions.contains(&"principal:manage"));

    // Universal actions are not expanded in the snapshot, but checks honor them.
    assert!(!permissions.contains(&"group:delete"));
    let (_, body) = t
        .send(
            "POST",
            "/authz/check",
            Some(&admin),
            Some(json!({ "resource": "group", "action": "delete" })),
        )
        .await;
    assert_eq!(body["allowed"], true);
}

#[tokio::test]
async fn protected_group_cannot_be_renamed() {
    let t = TestApp::new().await;
    let admin = t.admin_token().await;

    let (_, groups) = t.send("GET", "/groups?tenant=global", Some(&admin), None).await;
    let super_admin = groups
        .as_array()
        .unwrap()
        .iter()
        .find(|g| g["name"] == "super_admin")
        .expect("super_admin group")
        .clone();
    let uri = format!("/groups/{}", TestApp::id(&super_admin));

    let (status, _) = t
        .send("PATCH", &uri, Some(&admin), Some(json!({ "name": "root" })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = t
        .send(
            "PATCH",
            &uri,
            Some(&admin),
            Some(json!({ "description": "Built-in administrators" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "super_admin");

    let (status, _) = t.send("DELETE", &uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn grants_made_over_http_apply_to_existing_tokens() {
    let t = TestApp::new().await;
    let admin = t.admin_token().await;

    let (status, user) = t
        .send(
            "POST",
            "/principals",
            Some(&admin),
            Some(json!({ "displayName": "dana" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let user_id = TestApp::id(&user);
    let user_token = t.token(user_id.parse().unwrap(), "acme").await;

    let check = json!({ "resource": "staff", "action": "read" });
    let (status, body) = t
        .send("POST", "/authz/check", Some(&user_token), Some(check.clone()))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["allowed"], false);

    let (_, permission) = t
        .send(
            "POST",
            "/permissions",
            Some(&admin),
            Some(json!({ "resource": "staff", "action": "read" })),
        )
        .await;
    let (_, group) = t
        .send(
            "POST",
            "/groups",
            Some(&admin),
            Some(json!({ "name": "nurses", "tenant": "acme" })),
        )
        .await;
    let group_id = TestApp::id(&group);

    let (status, _) = t
        .send(
            "POST",
            &format!("/principals/{user_id}/groups"),
            Some(&admin),
            Some(json!({ "groupId": group_id, "tenant": "acme" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = t
        .send(
            "POST",
            &format!("/groups/{group_id}/permissions"),
            Some(&admin),
            Some(json!({ "permissionId": TestApp::id(&permission), "effect": "ALLOW" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    // Token was issued at version 1; the check reads the current grant state.
    let (status, body) = t
        .send("POST", "/authz/check", Some(&user_token), Some(check.clone()))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["allowed"], true);
    assert_eq!(body["decision"]["decision"], "allow");

    let (status, _) = t
        .send(
            "DELETE",
            &format!("/principals/{user_id}/groups/{group_id}?tenant=acme"),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, body) = t
        .send("POST", "/authz/check", Some(&user_token), Some(check))
        .await;
    assert_eq!(body["allowed"], false);
}

#[tokio::test]
async fn self_conditions_use_the_target_id() {
    let t = TestApp::new().await;
    let admin = t.admin_token().await;
    let user = t
        .state
        .grants
        .register_principal(None, "dana")
        .await
        .unwrap();
    let permission = t
        .state
        .grants
        .create_permission("profile", "update", None)
        .await
        .unwrap();

    let (status, _) = t
        .send(
            "POST",
            &format!("/principals/{}/permissions", user.id),
            Some(&admin),
            Some(json!({
                "permissionId": permission.id,
                "effect": "ALLOW",
                "tenant": "acme",
                "conditions": [{ "field": "isSelf", "operator": "eq", "value": true }],
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let token = t.token(user.id, "acme").await;
    let own = json!({ "resource": "profile", "action": "update", "targetId": user.id });
    let (_, body) = t.send("POST", "/authz/check", Some(&token), Some(own)).await;
    assert_eq!(body["allowed"], true);

    // isSelf supplied as an attribute is ignored.
    let spoofed = json!({
        "resource": "profile",
        "action": "update",
        "targetId": Uuid::new_v4(),
        "attributes": { "isSelf": true },
    });
    let (_, body) = t
        .send("POST", "/authz/check", Some(&token), Some(spoofed))
        .await;
    assert_eq!(body["allowed"], false);
}

#[tokio::test]
async fn malformed_grants_are_bad_requests() {
    let t = TestApp::new().await;
    let admin = t.admin_token().await;
    let user = t
        .state
        .grants
        .register_principal(None, "dana")
        .await
        .unwrap();
    let permission = t
        .state
        .grants
        .create_permission("staff", "read", None)
        .await
        .unwrap();

    let (status, body) = t
        .send(
            "POST",
            &format!("/principals/{}/permissions", user.id),
            Some(&admin),
            Some(json!({
                "permissionId": permission.id,
                "effect": "ALLOW",
                "conditions": [{ "field": "isSelf", "value": true }],
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation");

    let (status, _) = t
        .send(
            "DELETE",
            &format!("/principals/{}/permissions/{}?tenant=acme", user.id, permission.id),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn tenant_admin_cannot_join_protected_global_groups() {
    let t = TestApp::new().await;
    let (me, token) = t
        .tenant_admin("acme", &[("membership", "create")])
        .await;
    let super_admin = t.super_admin_group().await;
    let uri = format!("/principals/{me}/groups");

    let (status, body) = t
        .send(
            "POST",
            &uri,
            Some(&token),
            Some(json!({ "groupId": super_admin, "tenant": "global" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");

    // Same group, caller's own tenant.
    let (status, _) = t
        .send("POST", &uri, Some(&token), Some(json!({ "groupId": super_admin })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let memberships = t.state.grants.store().memberships(me).await.unwrap();
    assert!(memberships.iter().all(|m| m.group_id != super_admin));

    let global = t.token(me, "global").await;
    let (status, _) = t.send("GET", "/groups", Some(&global), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn tenant_admin_writes_stay_in_their_tenant() {
    let t = TestApp::new().await;
    let (_, token) = t
        .tenant_admin(
            "acme",
            &[
                ("grant", "create"),
                ("group", "create"),
                ("group", "update"),
                ("membership", "create"),
            ],
        )
        .await;
    let user = t
        .state
        .grants
        .register_principal(None, "dana")
        .await
        .unwrap();
    let permission = t
        .state
        .grants
        .create_permission("staff", "read", None)
        .await
        .unwrap();
    let grant_uri = format!("/principals/{}/permissions", user.id);

    let (status, _) = t
        .send(
            "POST",
            &grant_uri,
            Some(&token),
            Some(json!({ "permissionId": permission.id, "effect": "ALLOW", "tenant": "globex" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = t
        .send(
            "POST",
            "/groups",
            Some(&token),
            Some(json!({ "name": "intruders", "tenant": "globex" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let globex_staff = t
        .state
        .grants
        .create_group(NewGroup::new("staff", TenantId::new("globex")))
        .await
        .unwrap();
    let (status, _) = t
        .send(
            "PATCH",
            &format!("/groups/{}", globex_staff.id),
            Some(&token),
            Some(json!({ "isActive": false })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = t
        .send(
            "POST",
            &format!("/groups/{}/permissions", globex_staff.id),
            Some(&token),
            Some(json!({ "permissionId": permission.id, "effect": "ALLOW" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Inside acme the same calls succeed.
    let (status, grant) = t
        .send(
            "POST",
            &grant_uri,
            Some(&token),
            Some(json!({ "permissionId": permission.id, "effect": "ALLOW" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(grant["tenant"], "acme");

    let (status, group) = t
        .send("POST", "/groups", Some(&token), Some(json!({ "name": "nurses" })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, membership) = t
        .send(
            "POST",
            &format!("/principals/{}/groups", user.id),
            Some(&token),
            Some(json!({ "groupId": TestApp::id(&group) })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(membership["tenant"], "acme");
}

#[test]
fn operation_names_are_unique() {
    let mut names: Vec<&str> = warden_server::server::OPERATIONS
        .iter()
        .map(|op| op.name)
        .collect();
    let total = names.len();
    names.sort_unstable();
    names.dedup();
    assert_eq!(names.len(), total);
}

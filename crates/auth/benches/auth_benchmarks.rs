use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use chrono::Utc;
use userhub_auth::{
    CredentialVerifier, Identity, RoleGrant, TokenConfig, TokenService, permissions, roles,
};
use userhub_core::UserId;

fn identity() -> Identity {
    Identity::new(UserId::new(), "superadmin@mail.com", "")
        .with_role(roles::SUPERADMIN)
        .with_role_grant(RoleGrant::new(roles::SUPERADMIN, permissions::user_management()))
}

/// Token validation sits on every authenticated request; issuance only on login.
fn bench_tokens(c: &mut Criterion) {
    let svc = TokenService::new(TokenConfig::new("bench-secret-key-that-is-long-enough-for-hs256"))
        .expect("valid token config");
    let identity = identity();
    let now = Utc::now();
    let token = svc.issue(&identity, now).expect("issue");

    c.bench_function("token_issue", |b| {
        b.iter(|| svc.issue(black_box(&identity), now).expect("issue"))
    });

    c.bench_function("token_validate", |b| {
        b.iter(|| svc.validate(black_box(&token), now).expect("validate"))
    });
}

/// bcrypt verify cost grows 2x per cost step; this shows the login budget.
fn bench_password_verify(c: &mut Criterion) {
    let mut group = c.benchmark_group("password_verify");
    group.sample_size(10);

    for cost in [4u32, 8, 10] {
        let verifier = CredentialVerifier::with_cost(cost);
        let hash = verifier.hash("passwordadmin").expect("hash");
        group.bench_with_input(BenchmarkId::from_parameter(cost), &hash, |b, hash| {
            b.iter(|| verifier.verify(black_box("passwordadmin"), hash))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_tokens, bench_password_verify);
criterion_main!(benches);

//! Launch catalog and bootstrap admin account.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, EntityTrait, QueryFilter, Set,
};
use uuid::Uuid;

use crate::{
    db::OrmConn,
    entity::{
        Products, Role, Users,
        products::{ActiveModel as ProductActive, Column as ProdCol, Model as ProductModel},
        users::{ActiveModel as UserActive, Column as UserCol},
    },
    services::auth_service::{hash_password, normalize_email},
};

pub struct SeedProduct {
    pub title: &'static str,
    pub description: &'static str,
    pub long_description: &'static str,
    pub price_cents: i64,
    pub file_key: &'static str,
    pub cover_image_url: &'static str,
}

pub const CATALOG: [SeedProduct; 3] = [
    SeedProduct {
        title: "Décrochez votre alternance",
        description: "Le guide pratique pour trouver une alternance rapidement : CV, LinkedIn, \
            candidatures efficaces, préparation aux entretiens et exemples de messages.",
        long_description: "L’ouvrage est structuré en plusieurs parties. La première porte sur \
            la construction d’un CV adapté à l’alternance et l’optimisation de votre profil \
            LinkedIn. La deuxième aborde les stratégies de candidature : où chercher, comment \
            cibler les entreprises, quels messages envoyer pour décrocher un entretien. La \
            troisième partie est consacrée à la préparation aux entretiens : questions \
            fréquentes, exemples de réponses et conseils pour rester naturel. En fin \
            d’ouvrage, vous trouverez des modèles de messages de relance et des pistes pour \
            négocier votre contrat.",
        price_cents: 1490,
        file_key: "ebooks/decrochez-votre-alternance.pdf",
        cover_image_url: "/static/covers/decrochez-votre-alternance.png",
    },
    SeedProduct {
        title: "Chroniques d'une voix qui s'est révélé",
        description: "Un recueil intime de textes courts : doutes, déclics et reconstruction. \
            Une voix qui se cherche, puis se révèle.",
        long_description: "Le recueil rassemble une série de textes brefs, tantôt sous forme de \
            réflexions, tantôt de courtes narrations. Les thèmes traversés sont le doute, la \
            quête de soi, les moments de bascule où une décision ou une prise de conscience \
            change le cours des choses, et la reconstruction personnelle. L’ensemble dessine \
            un parcours où la voix, au sens de parole et d’identité, se cherche d’abord, puis \
            se déploie. Le ton est intime et accessible, sans être moralisateur.",
        price_cents: 990,
        file_key: "ebooks/chroniques-une-voix-qui-sest-revelee.pdf",
        cover_image_url: "/static/covers/chroniques-une-voix-qui-sest-revelee.png",
    },
    SeedProduct {
        title: "Le secret d'une belle diction",
        description: "Un ebook pour améliorer votre élocution et votre prise de parole : \
            exercices, conseils et astuces pour une diction claire et assurée.",
        long_description: "L’ebook commence par une présentation des bases de la diction : \
            respiration, placement de la voix, articulation. Il propose ensuite des exercices \
            progressifs (travail des voyelles et des consonnes, lecture à voix haute, variété \
            des rythmes) avec des indications concrètes pour s’entraîner au quotidien. Une \
            partie est dédiée à la prise de parole en public : gestion du stress, posture, \
            regard et clarté du message. En fin d’ouvrage, des fiches récapitulatives \
            permettent de retrouver rapidement les points clés et les enchaînements \
            d’exercices recommandés.",
        price_cents: 1290,
        file_key: "ebooks/ebook-le-secret-dune-belle-diction.pdf",
        cover_image_url: "/static/covers/le-secret-dune-belle-diction.png",
    },
];

/// Insert or refresh a catalog entry matched by title. Existing rows are
/// overwritten and re-activated. Returns the row and whether it was created.
pub async fn upsert_product(
    orm: &OrmConn,
    seed: &SeedProduct,
) -> anyhow::Result<(ProductModel, bool)> {
    let now = Utc::now().fixed_offset();
    let existing = Products::find()
        .filter(ProdCol::Title.eq(seed.title))
        .one(orm)
        .await?;

    if let Some(existing) = existing {
        let mut active: ProductActive = existing.into();
        active.description = Set(Some(seed.description.to_string()));
        active.long_description = Set(Some(seed.long_description.to_string()));
        active.price_cents = Set(seed.price_cents);
        active.file_key = Set(seed.file_key.to_string());
        active.cover_image_url = Set(Some(seed.cover_image_url.to_string()));
        active.is_active = Set(true);
        active.updated_at = Set(now);
        return Ok((active.update(orm).await?, false));
    }

    let product = ProductActive {
        id: Set(Uuid::new_v4()),
        title: Set(seed.title.to_string()),
        description: Set(Some(seed.description.to_string())),
        long_description: Set(Some(seed.long_description.to_string())),
        price_cents: Set(seed.price_cents),
        cover_image_url: Set(Some(seed.cover_image_url.to_string())),
        file_key: Set(seed.file_key.to_string()),
        sample_pdf_url: Set(None),
        is_active: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(orm)
    .await?;

    Ok((product, true))
}

pub async fn seed_catalog(orm: &OrmConn) -> anyhow::Result<Vec<(ProductModel, bool)>> {
    let mut seeded = Vec::with_capacity(CATALOG.len());
    for seed in &CATALOG {
        let (product, created) = upsert_product(orm, seed).await?;
        tracing::info!(
            product_id = %product.id,
            title = %product.title,
            created,
            "catalog entry seeded"
        );
        seeded.push((product, created));
    }
    Ok(seeded)
}

/// Make sure an active admin with this email exists. An existing account is
/// promoted and keeps its password.
pub async fn ensure_admin(orm: &OrmConn, email: &str, password: &str) -> anyhow::Result<Uuid> {
    let email = normalize_email(email);
    let existing = Users::find()
        .filter(UserCol::Email.eq(email.as_str()))
        .one(orm)
        .await?;

    if let Some(user) = existing {
        let id = user.id;
        let mut active: UserActive = user.into();
        active.role = Set(Role::Admin);
        active.is_active = Set(true);
        active.updated_at = Set(Utc::now().fixed_offset());
        active.update(orm).await?;
        tracing::info!(user_id = %id, %email, "admin account promoted");
        return Ok(id);
    }

    let password_hash = hash_password(password).map_err(|e| anyhow::anyhow!(e.to_string()))?;
    let user = UserActive {
        id: Set(Uuid::new_v4()),
        email: Set(email.clone()),
        password_hash: Set(password_hash),
        first_name: Set(None),
        last_name: Set(None),
        role: Set(Role::Admin),
        is_active: Set(true),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(orm)
    .await?;

    tracing::info!(user_id = %user.id, %email, "admin account created");
    Ok(user.id)
}

//! Sea-ORM Model 与领域类型之间的转换
//!
//! 枚举列（provider/role/plan/status）以字符串落库；解析失败时回退到
//! 默认值而不是报错，容忍历史数据。

use std::str::FromStr;

use crate::storage::models::{PlanTier, Provider, QrCode, Role, Subscription, SubscriptionStatus, User};
use migration::entities::{qr_code, subscription, user};

/// 将 Sea-ORM Model 转换为 QrCode
pub fn model_to_qr_code(model: qr_code::Model) -> QrCode {
    QrCode {
        id: model.id,
        user_id: model.user_id,
        name: model.qr_name,
        qr_type: model.qr_type,
        original_data: model.original_data,
        short_code: model.short_code,
        is_dynamic: model.is_dynamic,
        is_active: model.is_active,
        expires_at: model.expires_at,
        scan_limit: model.scan_limit.map(|v| v.max(0) as u64),
        scan_count: model.scan_count.max(0) as u64,
        foreground_color: model.foreground_color,
        background_color: model.background_color,
        gradient: model.gradient,
        eye_shape: model.eye_shape,
        module_style: model.module_style,
        logo_data: model.logo_data,
        created_at: model.created_at,
        updated_at: model.updated_at,
    }
}

/// 将 QrCode 转换为 ActiveModel（用于插入/更新）
pub fn qr_code_to_active_model(qr: &QrCode, is_new: bool) -> qr_code::ActiveModel {
    use sea_orm::ActiveValue::*;

    qr_code::ActiveModel {
        id: Set(qr.id.clone()),
        user_id: if is_new { Set(qr.user_id.clone()) } else { NotSet },
        qr_name: Set(qr.name.clone()),
        qr_type: if is_new { Set(qr.qr_type.clone()) } else { NotSet },
        original_data: Set(qr.original_data.clone()),
        short_code: if is_new { Set(qr.short_code.clone()) } else { NotSet },
        is_dynamic: if is_new { Set(qr.is_dynamic) } else { NotSet },
        is_active: Set(qr.is_active),
        expires_at: Set(qr.expires_at),
        scan_limit: Set(qr.scan_limit.map(|v| v as i64)),
        // 计数列只在插入时写入；之后由 ScanSink 的批量 UPDATE 独占
        scan_count: if is_new { Set(qr.scan_count as i64) } else { NotSet },
        foreground_color: Set(qr.foreground_color.clone()),
        background_color: Set(qr.background_color.clone()),
        gradient: Set(qr.gradient.clone()),
        eye_shape: Set(qr.eye_shape.clone()),
        module_style: Set(qr.module_style.clone()),
        logo_data: Set(qr.logo_data.clone()),
        created_at: if is_new { Set(qr.created_at) } else { NotSet },
        updated_at: Set(qr.updated_at),
    }
}

/// 将 Sea-ORM Model 转换为 User
pub fn model_to_user(model: user::Model) -> User {
    User {
        id: model.id,
        email: model.email,
        name: model.name,
        password_hash: model.password_hash,
        provider: Provider::from_str(&model.provider).unwrap_or_default(),
        role: Role::from_str(&model.role).unwrap_or_default(),
        plan: PlanTier::from_str(&model.plan).unwrap_or_default(),
        is_active: model.is_active,
        created_at: model.created_at,
        updated_at: model.updated_at,
    }
}

/// 将 User 转换为 ActiveModel
pub fn user_to_active_model(u: &User, is_new: bool) -> user::ActiveModel {
    use sea_orm::ActiveValue::*;

    user::ActiveModel {
        id: Set(u.id.clone()),
        email: Set(u.email.clone()),
        name: Set(u.name.clone()),
        password_hash: Set(u.password_hash.clone()),
        provider: if is_new { Set(u.provider.to_string()) } else { NotSet },
        role: Set(u.role.to_string()),
        plan: Set(u.plan.to_string()),
        is_active: Set(u.is_active),
        created_at: if is_new { Set(u.created_at) } else { NotSet },
        updated_at: Set(u.updated_at),
    }
}

/// 将 Sea-ORM Model 转换为 Subscription
pub fn model_to_subscription(model: subscription::Model) -> Subscription {
    Subscription {
        id: model.id,
        user_id: model.user_id,
        plan: PlanTier::from_str(&model.plan).unwrap_or_default(),
        amount: model.amount,
        currency: model.currency,
        provider: model.provider,
        provider_order_id: model.provider_order_id,
        provider_payment_id: model.provider_payment_id,
        status: SubscriptionStatus::from_str(&model.status).unwrap_or_default(),
        start_date: model.start_date,
        end_date: model.end_date,
        created_at: model.created_at,
    }
}

/// 将 Subscription 转换为 ActiveModel
pub fn subscription_to_active_model(s: &Subscription, is_new: bool) -> subscription::ActiveModel {
    use sea_orm::ActiveValue::*;

    subscription::ActiveModel {
        id: Set(s.id.clone()),
        user_id: if is_new { Set(s.user_id.clone()) } else { NotSet },
        plan: Set(s.plan.to_string()),
        amount: Set(s.amount),
        currency: Set(s.currency.clone()),
        provider: Set(s.provider.clone()),
        provider_order_id: Set(s.provider_order_id.clone()),
        provider_payment_id: Set(s.provider_payment_id.clone()),
        status: Set(s.status.to_string()),
        start_date: Set(s.start_date),
        end_date: Set(s.end_date),
        created_at: if is_new { Set(s.created_at) } else { NotSet },
    }
}

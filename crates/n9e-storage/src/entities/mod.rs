pub mod alert_aggr_view;
pub mod alert_cur_event;
pub mod alert_his_event;
pub mod alert_mute;
pub mod alert_rule;
pub mod alert_subscribe;
pub mod busi_group;
pub mod notification_record;
pub mod target;

use sea_orm_migration::prelude::*;
use sea_orm_migration::schema::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 创建 router 表
        manager
            .create_table(
                Table::create()
                    .table(Router::Table)
                    .if_not_exists()
                    .col(big_integer(Router::Id).auto_increment().primary_key())
                    .col(string(Router::Name))
                    .col(string(Router::PublicAddress))
                    .to_owned(),
            )
            .await?;

        // 创建 node_session 表
        manager
            .create_table(
                Table::create()
                    .table(NodeSession::Table)
                    .if_not_exists()
                    .col(big_integer(NodeSession::Id).auto_increment().primary_key())
                    .col(big_integer(NodeSession::CustomerId))
                    .col(big_integer(NodeSession::NodeId))
                    .col(unsigned(NodeSession::Ip))
                    .col(big_integer(NodeSession::Download).default(0))
                    .col(big_integer(NodeSession::Upload).default(0))
                    .col(big_integer(NodeSession::Start))
                    .col(big_integer(NodeSession::Stop))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_node_session_customer_id")
                    .table(NodeSession::Table)
                    .col(NodeSession::CustomerId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(NodeSession::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Router::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Router {
    Table,
    Id,
    Name,
    PublicAddress,
}

#[derive(DeriveIden)]
enum NodeSession {
    Table,
    Id,
    CustomerId,
    NodeId,
    Ip,
    Download,
    Upload,
    Start,
    Stop,
}

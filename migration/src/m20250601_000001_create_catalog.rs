use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Film::Table)
                    .if_not_exists()
                    .col(pk_auto(Film::Id))
                    .col(string(Film::Title))
                    .col(string(Film::Slug))
                    .col(string(Film::Image))
                    .col(integer(Film::Duration))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_film_slug")
                    .table(Film::Table)
                    .col(Film::Slug)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Cinema::Table)
                    .if_not_exists()
                    .col(pk_auto(Cinema::Id))
                    .col(string(Cinema::Slug))
                    .col(string(Cinema::Name))
                    .col(string(Cinema::Address))
                    .col(string(Cinema::City))
                    .col(double(Cinema::Lng))
                    .col(double(Cinema::Lat))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_cinema_slug")
                    .table(Cinema::Table)
                    .col(Cinema::Slug)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Showtime::Table)
                    .if_not_exists()
                    .col(pk_auto(Showtime::Id))
                    .col(integer(Showtime::FilmId))
                    .col(integer(Showtime::CinemaId))
                    .col(string(Showtime::Date))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_showtime_film_cinema_date")
                    .table(Showtime::Table)
                    .col(Showtime::FilmId)
                    .col(Showtime::CinemaId)
                    .col(Showtime::Date)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_showtime_date")
                    .table(Showtime::Table)
                    .col(Showtime::Date)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ShowtimeDetail::Table)
                    .if_not_exists()
                    .col(pk_auto(ShowtimeDetail::Id))
                    .col(integer(ShowtimeDetail::ShowtimeId))
                    .col(string(ShowtimeDetail::Time))
                    .col(string_null(ShowtimeDetail::Price))
                    .col(string_null(ShowtimeDetail::OrderLink))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_showtime_detail_showtime_time")
                    .table(ShowtimeDetail::Table)
                    .col(ShowtimeDetail::ShowtimeId)
                    .col(ShowtimeDetail::Time)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(ShowtimeDetail::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(Showtime::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(Cinema::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(Film::Table).to_owned()).await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Film {
    Table,
    Id,
    Title,
    Slug,
    Image,
    Duration,
}

#[derive(DeriveIden)]
enum Cinema {
    Table,
    Id,
    Slug,
    Name,
    Address,
    City,
    Lng,
    Lat,
}

#[derive(DeriveIden)]
enum Showtime {
    Table,
    Id,
    FilmId,
    CinemaId,
    Date,
}

#[derive(DeriveIden)]
enum ShowtimeDetail {
    Table,
    Id,
    ShowtimeId,
    Time,
    Price,
    OrderLink,
}
